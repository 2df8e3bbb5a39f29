// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! DDS return codes.
//!
//! The integer values are the ones a C binding hands back to callers: zero is
//! success, the DDS-defined failures occupy `-1..=-13`, and lower-level
//! (POSIX-like) failures live in an extended range starting at `-50`.

/// Return code taxonomy of the DDS API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum ReturnCode {
    Ok = 0,
    Error = -1,
    Unsupported = -2,
    BadParameter = -3,
    PreconditionNotMet = -4,
    OutOfResources = -5,
    NotEnabled = -6,
    ImmutablePolicy = -7,
    InconsistentPolicy = -8,
    AlreadyDeleted = -9,
    Timeout = -10,
    NoData = -11,
    IllegalOperation = -12,
    NotAllowedBySecurity = -13,

    // Extended range
    InProgress = -50,
    TryAgain = -51,
    Interrupted = -52,
    NotAllowed = -53,
    HostNotFound = -54,
    NoNetwork = -55,
    NoConnection = -56,
    NotEnoughSpace = -57,
    OutOfRange = -58,
    NotFound = -59,
}

const ALL: [ReturnCode; 24] = [
    ReturnCode::Ok,
    ReturnCode::Error,
    ReturnCode::Unsupported,
    ReturnCode::BadParameter,
    ReturnCode::PreconditionNotMet,
    ReturnCode::OutOfResources,
    ReturnCode::NotEnabled,
    ReturnCode::ImmutablePolicy,
    ReturnCode::InconsistentPolicy,
    ReturnCode::AlreadyDeleted,
    ReturnCode::Timeout,
    ReturnCode::NoData,
    ReturnCode::IllegalOperation,
    ReturnCode::NotAllowedBySecurity,
    ReturnCode::InProgress,
    ReturnCode::TryAgain,
    ReturnCode::Interrupted,
    ReturnCode::NotAllowed,
    ReturnCode::HostNotFound,
    ReturnCode::NoNetwork,
    ReturnCode::NoConnection,
    ReturnCode::NotEnoughSpace,
    ReturnCode::OutOfRange,
    ReturnCode::NotFound,
];

impl ReturnCode {
    #[inline]
    #[must_use]
    pub const fn as_i32(self) -> i32 {
        self as i32
    }

    /// Map an integer back to a return code. Unknown values yield `None`.
    #[must_use]
    pub fn from_i32(value: i32) -> Option<Self> {
        ALL.iter().copied().find(|rc| rc.as_i32() == value)
    }

    /// Symbolic name as used by the C API headers.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ReturnCode::Ok => "DDS_RETCODE_OK",
            ReturnCode::Error => "DDS_RETCODE_ERROR",
            ReturnCode::Unsupported => "DDS_RETCODE_UNSUPPORTED",
            ReturnCode::BadParameter => "DDS_RETCODE_BAD_PARAMETER",
            ReturnCode::PreconditionNotMet => "DDS_RETCODE_PRECONDITION_NOT_MET",
            ReturnCode::OutOfResources => "DDS_RETCODE_OUT_OF_RESOURCES",
            ReturnCode::NotEnabled => "DDS_RETCODE_NOT_ENABLED",
            ReturnCode::ImmutablePolicy => "DDS_RETCODE_IMMUTABLE_POLICY",
            ReturnCode::InconsistentPolicy => "DDS_RETCODE_INCONSISTENT_POLICY",
            ReturnCode::AlreadyDeleted => "DDS_RETCODE_ALREADY_DELETED",
            ReturnCode::Timeout => "DDS_RETCODE_TIMEOUT",
            ReturnCode::NoData => "DDS_RETCODE_NO_DATA",
            ReturnCode::IllegalOperation => "DDS_RETCODE_ILLEGAL_OPERATION",
            ReturnCode::NotAllowedBySecurity => "DDS_RETCODE_NOT_ALLOWED_BY_SECURITY",
            ReturnCode::InProgress => "DDS_RETCODE_IN_PROGRESS",
            ReturnCode::TryAgain => "DDS_RETCODE_TRY_AGAIN",
            ReturnCode::Interrupted => "DDS_RETCODE_INTERRUPTED",
            ReturnCode::NotAllowed => "DDS_RETCODE_NOT_ALLOWED",
            ReturnCode::HostNotFound => "DDS_RETCODE_HOST_NOT_FOUND",
            ReturnCode::NoNetwork => "DDS_RETCODE_NO_NETWORK",
            ReturnCode::NoConnection => "DDS_RETCODE_NO_CONNECTION",
            ReturnCode::NotEnoughSpace => "DDS_RETCODE_NOT_ENOUGH_SPACE",
            ReturnCode::OutOfRange => "DDS_RETCODE_OUT_OF_RANGE",
            ReturnCode::NotFound => "DDS_RETCODE_NOT_FOUND",
        }
    }

    /// Name for a raw integer, `"(unknown)"` when it is not a return code.
    #[must_use]
    pub fn name_of(value: i32) -> &'static str {
        Self::from_i32(value).map_or("(unknown)", Self::name)
    }
}

impl std::fmt::Display for ReturnCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
