//! Literal fixture values the suites feed into forms and expect back from the DOM

use serde::{Deserialize, Serialize};

use crate::spec::Viewport;

/// A user submitted through the magic-link login form.
///
/// The test code never stores it anywhere; it is only form input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestUser {
    pub name: String,
    pub email: String,
}

impl Default for TestUser {
    fn default() -> Self {
        Self {
            name: "Test User".to_string(),
            email: "test@example.com".to_string(),
        }
    }
}

/// Horse gender as encoded by the horse form's `select[name="gender"]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Stallion,
    Gelding,
    Mare,
}

impl Gender {
    /// Option value submitted by the form
    pub fn form_value(&self) -> &'static str {
        match self {
            Gender::Stallion => "1",
            Gender::Gelding => "2",
            Gender::Mare => "3",
        }
    }

    /// Label rendered on the detail page for an adult horse
    pub fn label(&self) -> &'static str {
        match self {
            Gender::Stallion => "Stallion",
            Gender::Gelding => "Gelding",
            Gender::Mare => "Mare",
        }
    }

    /// Heading of the dashboard stat card counting this gender
    pub fn stat_card(&self) -> &'static str {
        match self {
            Gender::Stallion => "Stallions",
            Gender::Gelding => "Geldings",
            Gender::Mare => "Mares",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorseFixture {
    pub name: String,
    pub description: String,
    /// `YYYY-MM-DD`, as accepted by `input[name="date_of_birth"]`
    pub date_of_birth: String,
    pub gender: Gender,
}

impl Default for HorseFixture {
    fn default() -> Self {
        Self {
            name: "Thunder".to_string(),
            description: "A beautiful stallion".to_string(),
            date_of_birth: "2020-05-15".to_string(),
            gender: Gender::Stallion,
        }
    }
}

/// Every oracle value the built-in suites depend on
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Fixtures {
    /// Expected in the homepage title and heading
    pub site_name: String,
    pub user: TestUser,
    pub farm_name: String,
    pub farm_id: String,
    /// Farm ids swept by the unauthenticated access check
    pub protected_farm_ids: Vec<String>,
    pub horse_id: String,
    pub horse: HorseFixture,
    pub unknown_path: String,
    /// Statuses accepted for an unknown route
    pub unknown_route_statuses: Vec<u16>,
    /// Raw statuses accepted when an anonymous request hits a protected route
    pub login_redirect_statuses: Vec<u16>,
    pub mobile_viewport: Viewport,
}

impl Default for Fixtures {
    fn default() -> Self {
        Self {
            site_name: "Devon Farm Sales".to_string(),
            user: TestUser::default(),
            farm_name: "Test Farm".to_string(),
            farm_id: "some-farm-id".to_string(),
            protected_farm_ids: vec!["some-farm-id".to_string()],
            horse_id: "some-horse-id".to_string(),
            horse: HorseFixture::default(),
            unknown_path: "/non-existent-page".to_string(),
            unknown_route_statuses: vec![404, 302],
            login_redirect_statuses: vec![302, 303],
            mobile_viewport: Viewport { width: 375, height: 667 },
        }
    }
}

impl Fixtures {
    pub fn farm_path(&self) -> String {
        format!("/farm/{}", self.farm_id)
    }

    pub fn horse_form_path(&self) -> String {
        format!("/farm/{}/horse", self.farm_id)
    }

    pub fn horse_path(&self) -> String {
        format!("/farm/{}/horse/{}", self.farm_id, self.horse_id)
    }
}
