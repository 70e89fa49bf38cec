use serde::de::DeserializeOwned;
use serde::Serialize;

/// A value that can be persisted in the versioned store.
///
/// Values are JSON-serializable and expose the version the store last
/// observed for them. The version is never part of the serialized form: it
/// is assigned by the store from the key's per-key version counter when the
/// value is read, and callers must hand the same value back to `update` or
/// `delete_value` for the compare-and-swap to be meaningful.
///
/// A freshly constructed value has version 0, which is also what the store
/// reports for an absent key. That is what makes `create` work.
pub trait Value: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn version(&self) -> i64;

    fn set_version(&mut self, version: i64);
}

/// Implements [`Value`] for a struct with a `version: i64` field.
///
/// The field should be marked `#[serde(skip)]` so that it never reaches the
/// store:
///
/// ```
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct Widget {
///     #[serde(skip)]
///     version: i64,
///     name: String,
/// }
///
/// cplane_storage::impl_value!(Widget);
/// ```
#[macro_export]
macro_rules! impl_value {
    ($ty:ty) => {
        impl $crate::Value for $ty {
            fn version(&self) -> i64 {
                self.version
            }

            fn set_version(&mut self, version: i64) {
                self.version = version;
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::Value;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Sample {
        #[serde(skip)]
        version: i64,
        field: String,
    }

    crate::impl_value!(Sample);

    #[test]
    fn version_is_not_serialized() {
        let mut s = Sample {
            field: "x".into(),
            ..Default::default()
        };
        s.set_version(7);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"field":"x"}"#);

        let back: Sample = serde_json::from_str(&json).unwrap();
        assert_eq!(back.version(), 0);
    }
}
