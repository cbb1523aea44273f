//! Built-in suites for the Devon Farm Sales application
//!
//! Scenarios that need a signed-in session are kept as skipped placeholders:
//! finishing the magic-link flow requires reading the emailed token, which
//! nothing here can do. Their steps stay in place as the intended oracles.

use crate::fixtures::{Fixtures, TestUser};
use crate::spec::{SuiteSpec, TestSpec, TestStep, TextMatch, UrlMatch, Viewport};

/// Reason attached to every scenario that needs a signed-in user
pub const NEEDS_AUTH_BYPASS: &str = "requires an authentication bypass";

pub const NAME_INPUT: &str = r#"input[name="name"]"#;
pub const EMAIL_INPUT: &str = r#"input[name="email"]"#;
pub const SUBMIT_BUTTON: &str = r#"button[type="submit"]"#;
pub const LOGIN_LINK: &str = r#"a[href="/login"]"#;

/// Every built-in suite, in declaration order
pub fn builtin(fixtures: &Fixtures) -> Vec<SuiteSpec> {
    vec![
        auth_suite(fixtures),
        farm_management_suite(fixtures),
        navigation_suite(fixtures),
        homepage_suite(fixtures),
    ]
}

/// Submit the login form and wait for the magic-link confirmation.
///
/// This stops short of a session: the callback token only exists in the
/// email that was sent.
pub fn authenticate_user(user: Option<&TestUser>) -> Vec<TestStep> {
    let default_user = TestUser::default();
    let user = user.unwrap_or(&default_user);

    vec![
        TestStep::navigate("/login"),
        TestStep::fill(NAME_INPUT, user.name.as_str()),
        TestStep::fill(EMAIL_INPUT, user.email.as_str()),
        TestStep::click(SUBMIT_BUTTON),
        TestStep::contains("body", TextMatch::regex_ci("check your email")),
    ]
}

pub fn auth_suite(fixtures: &Fixtures) -> SuiteSpec {
    let mut protected = TestSpec::new("should redirect unauthenticated farm access to login")
        .describe("Protected farm dashboards send anonymous visitors to the login page")
        .tag("auth");
    for id in &fixtures.protected_farm_ids {
        protected = protected
            .step(TestStep::navigate(format!("/farm/{}", id)))
            .step(TestStep::url(UrlMatch::path("/login")));
    }

    let mut redirect = TestSpec::new("should answer protected routes with a login redirect")
        .describe("Raw response for an anonymous farm request is a redirect to /login")
        .tag("auth")
        .tag("http");
    for id in &fixtures.protected_farm_ids {
        redirect = redirect.step(TestStep::Request {
            path: format!("/farm/{}", id),
            status_in: fixtures.login_redirect_statuses.clone(),
            location: Some("/login".to_string()),
        });
    }

    SuiteSpec::new("Authentication Flow", "auth.spec")
        .test(
            TestSpec::new("should display login form")
                .tag("auth")
                .tag("smoke")
                .step(TestStep::navigate("/login"))
                .step(TestStep::visible(NAME_INPUT))
                .step(TestStep::visible(EMAIL_INPUT))
                .step(TestStep::visible(SUBMIT_BUTTON)),
        )
        .test(
            TestSpec::new("should validate required fields")
                .describe("An empty submission never leaves the login page")
                .tag("auth")
                .step(TestStep::navigate("/login"))
                .step(TestStep::click(SUBMIT_BUTTON))
                .step(TestStep::url(UrlMatch::path("/login"))),
        )
        .test(
            TestSpec::new("should submit magic link request")
                .tag("auth")
                .tag("smoke")
                .step(TestStep::navigate("/login"))
                .step(TestStep::fill(NAME_INPUT, fixtures.user.name.as_str()))
                .step(TestStep::fill(EMAIL_INPUT, fixtures.user.email.as_str()))
                .step(TestStep::click(SUBMIT_BUTTON))
                .step(TestStep::url(UrlMatch::path("/login")))
                .step(TestStep::contains("body", TextMatch::regex_ci("check your email"))),
        )
        .test(protected)
        .test(redirect)
}

pub fn farm_management_suite(fixtures: &Fixtures) -> SuiteSpec {
    let horse = &fixtures.horse;
    let sign_in = authenticate_user(Some(&fixtures.user));

    SuiteSpec::new("Farm Management", "farm-management.spec")
        .test(
            TestSpec::new("should create a new farm")
                .tag("farm")
                .skip(NEEDS_AUTH_BYPASS)
                .steps(sign_in)
                .step(TestStep::url(UrlMatch::regex("/new/farm/")))
                .step(TestStep::fill(NAME_INPUT, fixtures.farm_name.as_str()))
                .step(TestStep::click(SUBMIT_BUTTON))
                .step(TestStep::url(UrlMatch::regex("/farm/")))
                .step(TestStep::contains(
                    "h1",
                    TextMatch::literal(format!("{} Dashboard", fixtures.farm_name)),
                )),
        )
        .test(
            TestSpec::new("should display farm dashboard")
                .tag("farm")
                .skip(NEEDS_AUTH_BYPASS)
                .step(TestStep::navigate(fixtures.farm_path()))
                .step(TestStep::contains("h1", TextMatch::regex("Dashboard")))
                .step(TestStep::visible(".dashboard-stats"))
                // Total, Stallions, Mares, Geldings
                .step(TestStep::count(".stat-card", 4))
                .step(TestStep::contains(r#"a[href*="/horse"]"#, TextMatch::regex("Add New Horse")))
                .step(TestStep::contains(r#"a[href*="/horses"]"#, TextMatch::regex("View All Horses"))),
        )
        .test(
            TestSpec::new("should add a new horse")
                .tag("farm")
                .tag("horse")
                .skip(NEEDS_AUTH_BYPASS)
                .step(TestStep::navigate(fixtures.farm_path()))
                .step(TestStep::click(r#"a[href*="/horse"]:has-text("Add New Horse")"#))
                .step(TestStep::url(UrlMatch::regex("/farm/.*/horse$")))
                .step(TestStep::fill(NAME_INPUT, horse.name.as_str()))
                .step(TestStep::fill(r#"textarea[name="description"]"#, horse.description.as_str()))
                .step(TestStep::fill(r#"input[name="date_of_birth"]"#, horse.date_of_birth.as_str()))
                .step(TestStep::select(r#"select[name="gender"]"#, horse.gender.form_value()))
                .step(TestStep::click(SUBMIT_BUTTON))
                .step(TestStep::url(UrlMatch::regex("/farm/")))
                .step(TestStep::contains(".horse-card", TextMatch::literal(horse.name.as_str())))
                .step(TestStep::contains(
                    r#".stat-card:has-text("Total Horses") .stat-number"#,
                    TextMatch::literal("1"),
                ))
                .step(TestStep::contains(
                    format!(r#".stat-card:has-text("{}") .stat-number"#, horse.gender.stat_card()),
                    TextMatch::literal("1"),
                )),
        )
        .test(
            TestSpec::new("should validate horse form inputs")
                .tag("horse")
                .skip(NEEDS_AUTH_BYPASS)
                .step(TestStep::navigate(fixtures.horse_form_path()))
                .step(TestStep::click(SUBMIT_BUTTON))
                .step(TestStep::visible(".error"))
                .step(TestStep::fill(NAME_INPUT, "Test Horse"))
                .step(TestStep::click(SUBMIT_BUTTON))
                .step(TestStep::visible(".error")),
        )
        .test(
            TestSpec::new("should display horse details")
                .tag("horse")
                .skip(NEEDS_AUTH_BYPASS)
                .step(TestStep::navigate(fixtures.horse_path()))
                .step(TestStep::contains("h1", TextMatch::literal(horse.name.as_str())))
                .step(TestStep::contains("body", TextMatch::literal(horse.gender.label())))
                .step(TestStep::contains("body", TextMatch::literal(horse.description.as_str())))
                .step(TestStep::contains(r#"a[href*="/edit"]"#, TextMatch::regex("Edit"))),
        )
}

pub fn navigation_suite(fixtures: &Fixtures) -> SuiteSpec {
    let Viewport { width, height } = fixtures.mobile_viewport;

    SuiteSpec::new("Navigation and UI", "farm-management.spec")
        .test(
            TestSpec::new("should have responsive design")
                .describe("Primary navigation survives a phone-sized viewport")
                .tag("navigation")
                .step(TestStep::navigate("/"))
                .step(TestStep::SetViewport { width, height })
                .step(TestStep::visible("h1"))
                .step(TestStep::visible(LOGIN_LINK)),
        )
        .test(
            TestSpec::new("should handle 404 pages")
                .describe("Unknown routes are not found or sent home, never served")
                .tag("navigation")
                .step(TestStep::navigate(fixtures.unknown_path.as_str()))
                .step(TestStep::ExpectResponse {
                    url_contains: fixtures.unknown_path.clone(),
                    status_in: fixtures.unknown_route_statuses.clone(),
                }),
        )
}

pub fn homepage_suite(fixtures: &Fixtures) -> SuiteSpec {
    SuiteSpec::new("Homepage", "homepage.spec")
        .test(
            TestSpec::new("should display the homepage correctly")
                .tag("homepage")
                .tag("smoke")
                .step(TestStep::navigate("/"))
                .step(TestStep::AssertTitle {
                    title: TextMatch::regex(regex::escape(&fixtures.site_name)),
                })
                .step(TestStep::contains("h1", TextMatch::literal(fixtures.site_name.as_str())))
                .step(TestStep::visible(LOGIN_LINK)),
        )
        .test(
            TestSpec::new("should navigate to login page")
                .tag("homepage")
                .step(TestStep::navigate("/"))
                .step(TestStep::click(LOGIN_LINK))
                .step(TestStep::url(UrlMatch::path("/login")))
                .step(TestStep::contains("h1", TextMatch::regex_ci("Log in"))),
        )
}
