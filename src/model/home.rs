use super::user;

pub type Id = i64;

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct Home {
    pub id: Id,
    pub host: user::Id,
    pub name: String,
    pub price: f64,
    pub location: String,
    pub rating: f64,
    /// Public path of the photo, e.g. `/uploads/abcdefghij-house.png`.
    pub photo: Option<String>,
    pub description: String,
}

/// Basically just a [`Home`] without an id.
#[derive(Clone, Debug, PartialEq)]
pub struct NewHome {
    pub host: user::Id,
    pub name: String,
    pub price: f64,
    pub location: String,
    pub rating: f64,
    pub photo: Option<String>,
    pub description: String,
}

impl NewHome {
    pub fn with_id(self, id: Id) -> Home {
        Home {
            id,
            host: self.host,
            name: self.name,
            price: self.price,
            location: self.location,
            rating: self.rating,
            photo: self.photo,
            description: self.description,
        }
    }
}
