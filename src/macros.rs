/// A Context "literal".
macro_rules! context {
    ($($name:ident : $value:expr),* $(,)*) => {{
        let mut ctx = ::tera::Context::new();
        $(ctx.insert(stringify!($name), &$value);)*
        ctx
    }};
}

/// Declares a fieldless enum stored as text, with its string codes.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $code:literal,)*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* #[serde(rename = $code)] $variant,)*
        }

        impl $name {
            /// Every variant, in declaration order.
            pub const ALL: &'static [$name] = &[$($name::$variant,)*];

            /// The code stored in the database.
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $code,)*
                }
            }
        }

        impl ::std::str::FromStr for $name {
            type Err = $crate::Error;

            fn from_str(s: &str) -> $crate::Result<$name> {
                match s {
                    $($code => Ok($name::$variant),)*
                    _ => Err($crate::ErrorKind::InvalidData(format!(
                        "Unknown {} {:?}",
                        stringify!($name),
                        s
                    )).into()),
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}
