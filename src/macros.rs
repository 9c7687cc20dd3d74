macro_rules! net_log {
    (trace, $($arg:expr),* $(,)?) => { log::trace!($($arg),*) };
    (debug, $($arg:expr),* $(,)?) => { log::debug!($($arg),*) };
}

macro_rules! net_trace {
    ($($arg:expr),* $(,)?) => (net_log!(trace, $($arg),*));
}

macro_rules! net_debug {
    ($($arg:expr),* $(,)?) => (net_log!(debug, $($arg),*));
}

/// Define an enumeration with known variants and an unknown representation.
///
/// Protocol fields often leave most bit patterns unassigned. The generated
/// enum converts to and from the underlying integer, keeping unassigned values
/// in an `Unknown` variant instead of failing.
macro_rules! enum_with_unknown {
    (
        $( #[$enum_attr:meta] )*
        pub enum $name:ident($ty:ty) {
            $(
              $( #[$variant_attr:meta] )*
              $variant:ident = $value:expr
            ),+ $(,)?
        }
    ) => {
        #[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Clone, Copy)]
        $( #[$enum_attr] )*
        pub enum $name {
            $(
              $( #[$variant_attr] )*
              $variant
            ),*,
            Unknown($ty)
        }

        impl ::core::convert::From<$ty> for $name {
            fn from(value: $ty) -> Self {
                match value {
                    $( $value => $name::$variant ),*,
                    other => $name::Unknown(other)
                }
            }
        }

        impl ::core::convert::From<$name> for $ty {
            fn from(value: $name) -> Self {
                match value {
                    $( $name::$variant => $value ),*,
                    $name::Unknown(other) => other
                }
            }
        }
    }
}
