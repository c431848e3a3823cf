///
/// Adapted from the `oauth2` crate's newtype macros (not part of that crate's
/// stable public interface).
///
macro_rules! new_type {
    // Convenience pattern without an impl.
    (
        $(#[$attr:meta])*
        $name:ident($type:ty)
    ) => {
        new_type![
            $(#[$attr])*
            $name($type)
            impl {}
        ];
    };
    // Main entry point with an impl.
    (
        $(#[$attr:meta])*
        $name:ident($type:ty)
        impl {
            $($item:tt)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Debug, PartialEq)]
        pub struct $name($type);
        impl $name {
            #[doc = concat!(
                "Create a new `", stringify!($name), "` to wrap the given `",
                stringify!($type), "`."
            )]
            pub fn new(value: $type) -> Self {
                $name(value)
            }
            $($item)*
        }
        impl std::ops::Deref for $name {
            type Target = $type;
            fn deref(&self) -> &$type {
                &self.0
            }
        }
    };
}

///
/// Like [`new_type!`], but with a redacted `Debug` implementation and an
/// explicit `secret()` accessor, so that secrets do not leak into logs by
/// accident. Secret types deliberately do not implement `PartialEq`; direct
/// comparisons of secret values risk timing side-channels.
///
macro_rules! new_secret_type {
    (
        $(#[$attr:meta])*
        $name:ident($type:ty)
    ) => {
        new_secret_type![
            $(#[$attr])*
            $name($type)
            impl {}
        ];
    };
    (
        $(#[$attr:meta])*
        $name:ident($type:ty)
        impl {
            $($item:tt)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone)]
        pub struct $name($type);
        impl $name {
            #[doc = concat!(
                "Create a new `", stringify!($name), "` to wrap the given `",
                stringify!($type), "`."
            )]
            pub fn new(value: $type) -> Self {
                $name(value)
            }
            #[doc = concat!(
                "Get the secret contained within this `", stringify!($name), "`."
            )]
            ///
            /// # Security Warning
            ///
            /// Leaking this value may compromise the security of the OpenID flow.
            pub fn secret(&self) -> &$type {
                &self.0
            }
            $($item)*
        }
        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> Result<(), std::fmt::Error> {
                write!(f, concat!(stringify!($name), "([redacted])"))
            }
        }
    };
}

///
/// Creates a URL-specific newtype.
///
/// Types created by this macro normalize the wrapped value during
/// construction: a missing scheme defaults to `http`, the host is lowercased,
/// default ports are elided, and an empty path becomes `/`. Comparisons and
/// hashes are based on the normalized serialization, which is what the
/// OpenID 1.x wire protocol compares.
///
macro_rules! new_url_type {
    // Convenience pattern without an impl.
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        new_url_type![
            $(#[$attr])*
            $name
            impl {}
        ];
    };
    // Main entry point with an impl.
    (
        $(#[$attr:meta])*
        $name:ident
        impl {
            $($item:tt)*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone)]
        pub struct $name(Url, String);
        impl $name {
            #[doc = concat!(
                "Create a new `", stringify!($name), "`, normalizing the given URL."
            )]
            pub fn new(url: String) -> Result<Self, ::url::ParseError> {
                let parsed = crate::types::normalize_url(&url)?;
                let serialized = parsed.to_string();
                Ok($name(parsed, serialized))
            }
            /// Return the parsed URL.
            pub fn url(&self) -> &Url {
                &self.0
            }
            $($item)*
        }
        impl std::ops::Deref for $name {
            type Target = String;
            fn deref(&self) -> &String {
                &self.1
            }
        }
        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> Result<(), ::std::fmt::Error> {
                f.debug_tuple(stringify!($name)).field(&self.1).finish()
            }
        }
        impl<'de> ::serde::Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: ::serde::de::Deserializer<'de>,
            {
                struct UrlVisitor;
                impl<'de> ::serde::de::Visitor<'de> for UrlVisitor {
                    type Value = $name;

                    fn expecting(
                        &self,
                        formatter: &mut ::std::fmt::Formatter,
                    ) -> ::std::fmt::Result {
                        formatter.write_str(stringify!($name))
                    }

                    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                    where
                        E: ::serde::de::Error,
                    {
                        $name::new(v.to_string()).map_err(E::custom)
                    }
                }
                deserializer.deserialize_str(UrlVisitor {})
            }
        }
        impl ::serde::Serialize for $name {
            fn serialize<SE>(&self, serializer: SE) -> Result<SE::Ok, SE::Error>
            where
                SE: ::serde::Serializer,
            {
                serializer.serialize_str(&self.1)
            }
        }
        impl ::std::hash::Hash for $name {
            fn hash<H: ::std::hash::Hasher>(&self, state: &mut H) {
                ::std::hash::Hash::hash(&(self.1), state);
            }
        }
        impl PartialEq for $name {
            fn eq(&self, other: &$name) -> bool {
                self.1 == other.1
            }
        }
        impl Eq for $name {}
    };
}
