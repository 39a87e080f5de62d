/// Attaches call site, arguments and context values to an error.
///
/// Forms:
/// - `ectx!(err e, Ctx1, Ctx2 => arg1, arg2)` - wraps `e`, converts into the expected error type
/// - `ectx!(try err e, ...)` - same, but yields the `Error` type in scope (for use with `?`)
/// - `ectx!(convert err e, ...)` - uses `e.kind()` converted into the local `ErrorKind` as the last context
/// - `ectx!(Ctx, ... => args)`, `ectx!(try ...)`, `ectx!(convert ...)`, `ectx!(try convert ...)` -
///   closure versions of the above, meant for `map_err`
///
/// Every module using the `try` or `convert` forms must have `Error` and `ErrorKind` in scope.
macro_rules! ectx {
    (err $e:expr $(,$context:expr)* $(=> $($arg:expr),*)*) => {{
        #[allow(unused_mut)]
        let mut msg = format!("at {}:{}", file!(), line!());
        $(
            $(
                msg.push_str(&format!("\nwith args - {}: {:?}", stringify!($arg), $arg));
            )*
        )*
        let err = $e.context(msg);
        $(
            let err = err.context($context);
        )*
        err.into()
    }};

    (try err $e:expr $(,$context:expr)* $(=> $($arg:expr),*)*) => {{
        let e: Error = ectx!(err $e $(,$context)* $(=> $($arg),*)*);
        e
    }};

    (convert err $e:expr $(,$context:expr)* $(=> $($arg:expr),*)*) => {{
        let kind: ErrorKind = $e.kind().into();
        ectx!(err $e $(,$context)*, kind $(=> $($arg),*)*)
    }};

    (try convert err $e:expr $(,$context:expr)* $(=> $($arg:expr),*)*) => {{
        let kind: ErrorKind = $e.kind().into();
        ectx!(try err $e $(,$context)*, kind $(=> $($arg),*)*)
    }};

    (try convert $($context:expr),* $(=> $($arg:expr),*)*) => {{
        move |e| ectx!(try convert err e $(,$context)* $(=> $($arg),*)*)
    }};

    (convert $($context:expr),* $(=> $($arg:expr),*)*) => {{
        move |e| ectx!(convert err e $(,$context)* $(=> $($arg),*)*)
    }};

    (try $($context:expr),* $(=> $($arg:expr),*)*) => {{
        move |e| ectx!(try err e $(,$context)* $(=> $($arg),*)*)
    }};

    ($($context:expr),* $(=> $($arg:expr),*)*) => {{
        move |e| ectx!(err e $(,$context)* $(=> $($arg),*)*)
    }};
}

/// Implements `Fail`, `Display`, `kind()` and the `From` conversions for a layer error
/// of the shape `Error { inner: Context<ErrorKind> }`.
///
/// Expects `Backtrace`, `Context`, `Fail` from `failure` and `std::fmt` to be in scope.
macro_rules! derive_error_impls {
    () => {
        impl Fail for Error {
            fn cause(&self) -> Option<&dyn Fail> {
                self.inner.cause()
            }

            fn backtrace(&self) -> Option<&Backtrace> {
                self.inner.backtrace()
            }
        }

        impl Error {
            #[allow(dead_code)]
            pub fn kind(&self) -> ErrorKind {
                self.inner.get_context().clone()
            }
        }

        impl From<ErrorKind> for Error {
            fn from(kind: ErrorKind) -> Error {
                Error {
                    inner: Context::new(kind),
                }
            }
        }

        impl From<Context<ErrorKind>> for Error {
            fn from(inner: Context<ErrorKind>) -> Error {
                Error { inner }
            }
        }

        impl fmt::Display for Error {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                fmt::Display::fmt(&self.inner, f)
            }
        }
    };
}

/// Diesel `FromSql` / `ToSql` for a single field newtype.
/// The type itself must derive `FromSqlRow` and `AsExpression`.
macro_rules! derive_newtype_sql {
    ($mod_name:ident, $sql_type:ty, $type:ty, $constructor:expr) => {
        mod $mod_name {
            use super::*;
            use diesel::deserialize::{self, FromSql};
            use diesel::pg::Pg;
            use diesel::serialize::{self, Output, ToSql};
            use std::io::Write;

            impl FromSql<$sql_type, Pg> for $type {
                fn from_sql(data: Option<&[u8]>) -> deserialize::Result<Self> {
                    FromSql::<$sql_type, Pg>::from_sql(data).map($constructor)
                }
            }

            impl ToSql<$sql_type, Pg> for $type {
                fn to_sql<W: Write>(&self, out: &mut Output<W, Pg>) -> serialize::Result {
                    ToSql::<$sql_type, Pg>::to_sql(&self.0, out)
                }
            }
        }
    };
}

/// Uuid newtype id with generation, parsing, display and diesel support.
macro_rules! uuid_id {
    ($(#[$attr:meta])* $name:ident, $mod_name:ident) => {
        $(#[$attr])*
        #[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, From, FromStr, Serialize, Deserialize, FromSqlRow, AsExpression)]
        #[sql_type = "diesel::sql_types::Uuid"]
        pub struct $name(pub ::uuid::Uuid);

        derive_newtype_sql!($mod_name, diesel::sql_types::Uuid, $name, $name);

        impl $name {
            pub fn new(id: ::uuid::Uuid) -> Self {
                $name(id)
            }

            pub fn generate() -> Self {
                $name(::uuid::Uuid::new_v4())
            }

            pub fn inner(&self) -> ::uuid::Uuid {
                self.0
            }
        }
    };
}

/// Status-like enum stored as VarChar: `FromStr`, `Display` and diesel impls
/// from a list of `Variant => "db_value"` pairs.
/// The enum must derive `FromSqlRow` and `AsExpression` with `#[sql_type = "VarChar"]`.
macro_rules! derive_varchar_enum {
    ($type:ident, $parse_error:ident, { $($variant:ident => $value:tt),+ $(,)* }) => {
        #[derive(Debug, Clone, Fail)]
        #[fail(display = "failed to parse {}", _0)]
        pub struct $parse_error(pub String);

        impl ::std::str::FromStr for $type {
            type Err = $parse_error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($type::$variant),)+
                    other => Err($parse_error(other.to_string())),
                }
            }
        }

        impl ::std::fmt::Display for $type {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                match self {
                    $($type::$variant => f.write_str($value),)+
                }
            }
        }

        impl ::diesel::deserialize::FromSql<::diesel::sql_types::VarChar, ::diesel::pg::Pg> for $type {
            fn from_sql(data: Option<&[u8]>) -> ::diesel::deserialize::Result<Self> {
                let value = <String as ::diesel::deserialize::FromSql<::diesel::sql_types::VarChar, ::diesel::pg::Pg>>::from_sql(data)?;
                value
                    .parse::<$type>()
                    .map_err(|_| format!("Unrecognized enum variant for {}: {}", stringify!($type), value).into())
            }
        }

        impl ::diesel::serialize::ToSql<::diesel::sql_types::VarChar, ::diesel::pg::Pg> for $type {
            fn to_sql<W: ::std::io::Write>(
                &self,
                out: &mut ::diesel::serialize::Output<W, ::diesel::pg::Pg>,
            ) -> ::diesel::serialize::Result {
                let value: &'static str = match self {
                    $($type::$variant => $value,)+
                };
                ::std::io::Write::write_all(out, value.as_bytes())?;
                Ok(::diesel::serialize::IsNull::No)
            }
        }
    };
}
