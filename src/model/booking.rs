use super::Home;

pub type Id = i64;

#[derive(Clone, Debug, serde::Serialize)]
pub struct Booking {
    pub id: Id,
    pub home: Home,
    /// Unix seconds
    pub created: i64,
}
