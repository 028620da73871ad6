use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::lenient;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Restaurant {
    pub id: u64,
    pub name: String,
    #[serde(default)]
    pub neighborhood: Option<String>,
    #[serde(default)]
    pub cuisine_type: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub photograph: Option<String>,
    #[serde(default)]
    pub latlng: Option<LatLng>,
    /// The server has returned this both as a boolean and as a string
    #[serde(default, deserialize_with = "lenient::bool_or_string")]
    pub is_favorite: bool,
    /// Fields this client does not interpret (operating hours, timestamps, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Restaurant {
    /// Look up a string-valued attribute by its wire name.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        match name {
            "name" => Some(self.name.as_str()),
            "neighborhood" => self.neighborhood.as_deref(),
            "cuisine_type" => self.cuisine_type.as_deref(),
            "address" => self.address.as_deref(),
            "photograph" => self.photograph.as_deref(),
            other => self.extra.get(other).and_then(Value::as_str),
        }
    }

    pub fn display_name(&self) -> String {
        if self.is_favorite {
            format!("{} (favorite)", self.name)
        } else {
            self.name.clone()
        }
    }
}
