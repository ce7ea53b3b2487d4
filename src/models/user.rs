use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(sqlx::FromRow, Debug, Clone)]
pub struct User {
    pub user_id: i32,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub contact: String,
    pub image: Option<String>,
    pub biography: Option<String>,
    /// bcrypt hash, never the plain password
    pub password: String,
    pub user_type: String,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl User {
    /// Full name in "Last First" order
    pub fn full_name(&self) -> String {
        format!("{} {}", self.last_name, self.first_name)
    }

    /// Name in "First Last" order, as greeted on sign-up and login
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    pub fn role(&self) -> Option<UserType> {
        self.user_type.parse().ok()
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Some(UserType::Admin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Admin,
    Staff,
    Client,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Admin => "admin",
            UserType::Staff => "staff",
            UserType::Client => "client",
        }
    }

    /// Accounts of this type can only be created with the super key
    pub fn is_privileged(&self) -> bool {
        matches!(self, UserType::Admin | UserType::Staff)
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserType::Admin),
            "staff" => Ok(UserType::Staff),
            "client" => Ok(UserType::Client),
            other => Err(format!("unknown user type '{other}'")),
        }
    }
}

/// Public representation of a user, without the password hash
#[derive(Serialize, Debug, Clone)]
pub struct UserView {
    pub id: i32,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub contact: String,
    pub image: Option<String>,
    pub biography: Option<String>,
    #[serde(rename = "type")]
    pub user_type: String,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<&User> for UserView {
    fn from(user: &User) -> Self {
        Self {
            id: user.user_id,
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            username: user.full_name(),
            email: user.email.clone(),
            contact: user.contact.clone(),
            image: user.image.clone(),
            biography: user.biography.clone(),
            user_type: user.user_type.clone(),
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_type: &str) -> User {
        User {
            user_id: 7,
            first_name: "Ama".to_string(),
            last_name: "Mensah".to_string(),
            email: "ama@example.com".to_string(),
            contact: "0240000000".to_string(),
            image: None,
            biography: None,
            password: "$2b$12$hash".to_string(),
            user_type: user_type.to_string(),
            created_at: chrono::Utc::now().naive_utc(),
            updated_at: None,
        }
    }

    #[test]
    fn full_name_is_last_then_first() {
        assert_eq!(user("client").full_name(), "Mensah Ama");
        assert_eq!(user("client").display_name(), "Ama Mensah");
    }

    #[test]
    fn role_parsing() {
        assert!(user("admin").is_admin());
        assert_eq!(user("staff").role(), Some(UserType::Staff));
        assert_eq!(user("client").role(), Some(UserType::Client));
        assert_eq!(user("SuperAdmin").role(), None);
        assert!(UserType::Staff.is_privileged());
        assert!(!UserType::Client.is_privileged());
    }

    #[test]
    fn view_hides_password() {
        let json = serde_json::to_value(UserView::from(&user("staff"))).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["type"], "staff");
        assert_eq!(json["username"], "Mensah Ama");
    }
}
