use std::{fmt, str::FromStr};

pub type Id = i64;

#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Guest,
    Host,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Guest => "guest",
            UserType::Host => "host",
        }
    }
}

impl FromStr for UserType {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(UserType::Guest),
            "host" => Ok(UserType::Host),
            _ => Err(()),
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct User {
    pub id: Id,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(skip)] // Never hand the hash to a template
    pub password: String,
    pub user_type: UserType,
}

/// A [`User`] that hasn't been stored yet. `password` is already hashed.
#[derive(Clone)]
pub struct NewUser {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub password: String,
    pub user_type: UserType,
}

impl fmt::Debug for NewUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Don't print the password
        f.debug_struct("NewUser")
            .field("email", &self.email)
            .field("user_type", &self.user_type)
            .finish()
    }
}
