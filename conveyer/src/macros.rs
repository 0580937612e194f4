//! Macros for conveyer error handling.
//!
//! Provides convenience macros for creating and returning [`crate::error::ConveyerError`]
//! instances with reduced boilerplate.

/// Creates a [`crate::error::ConveyerError`] from error kind and description.
///
/// Accepts an optional dynamic detail (any [`ToString`] value, or `detail =` to move an owned
/// [`String`]) and an optional source error.
#[macro_export]
macro_rules! conveyer_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::ConveyerError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::ConveyerError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::ConveyerError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::ConveyerError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::ConveyerError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Creates and returns a [`crate::error::ConveyerError`] from the current function.
///
/// Supports the same optional detail and source arguments as [`conveyer_error!`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::conveyer_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::conveyer_error!($kind, $desc, source: $source))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::conveyer_error!($kind, $desc, detail = $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::conveyer_error!($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        return ::core::result::Result::Err($crate::conveyer_error!(
            $kind,
            $desc,
            $detail,
            source: $source
        ))
    };
}
