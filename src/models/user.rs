use mongodb::bson::oid::ObjectId;
use serde::{Deserialize, Serialize};

pub const ROLE_ADMIN: &str = "admin";

/// A single stored user document.
///
/// `role` is absent for ordinary users and `"admin"` for privileged ones.
/// The field must stay out of the document when it is `None`: the dashboard
/// listing filters on `role: { $exists: false }`.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub email: String,
    pub username: String,
    pub name: String,
    pub age: String,
    pub gender: String,
    pub country: String,
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role.as_deref() == Some(ROLE_ADMIN)
    }
}
