use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(PartialEq, Eq, Hash, Clone, Ord, PartialOrd, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }
            pub fn as_str(&self) -> &str { &self.0 }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}({})", stringify!($name), self.0) }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self { Self(id.to_owned()) }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self { Self(id) }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str { &self.0 }
        }
    };
}

string_id!(
    /// Logical card identifier, shared by every revision of the same card
    CardId
);
string_id!(
    /// Opaque revision identifier of a card. Revisions of one card are published in increasing order.
    CardUid
);
string_id!(
    /// Identifier of an entity (an organisational unit able to publish and acknowledge cards)
    EntityId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_serialize_as_plain_strings() {
        let id = CardId::new("process.instance1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"process.instance1\"");
        let back: CardId = serde_json::from_str("\"process.instance1\"").unwrap();
        assert_eq!(back, id);
        assert_eq!(format!("{:?}", back), "CardId(process.instance1)");
    }
}
