// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # DDS Core API
//!
//! Entities are addressed through [`Entity`] handles, exactly like the C API:
//! every operation is a free function taking the handle it acts on, and every
//! failure maps onto one [`ReturnCode`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use cdds::dds::{self, Entity};
//! # use cdds::core::ser::{Cursor, CdrWriter, SerResult};
//! # #[derive(Default, Clone)] struct Sensor { id: u32, value: f64 }
//! # impl cdds::core::serdata::TopicType for Sensor {
//! #     fn type_name() -> &'static str { "Sensor" }
//! #     fn encode(&self, w: &mut CdrWriter) -> SerResult<()> { w.write_u32(self.id)?; w.write_f64(self.value) }
//! #     fn decode(r: &mut Cursor<'_>) -> SerResult<Self> { Ok(Self { id: r.read_u32()?, value: r.read_f64()? }) }
//! # }
//!
//! let participant = dds::create_participant(0, None, None)?;
//! let topic = dds::create_topic::<Sensor>(participant, "sensors", None, None)?;
//! let writer = dds::create_writer(participant, topic, None, None)?;
//! let reader = dds::create_reader(participant, topic, None, None)?;
//!
//! dds::write(writer, &Sensor { id: 1, value: 42.0 })?;
//!
//! let mut samples = vec![Sensor::default(); 4];
//! let mut infos = vec![dds::SampleInfo::default(); 4];
//! let n = dds::take(reader, &mut samples, &mut infos, 4)?;
//! assert_eq!(n, 1);
//! dds::delete(participant)?;
//! # Ok::<(), cdds::Error>(())
//! ```
//!
//! ## Entity Hierarchy
//!
//! ```text
//! Participant
//! +-- Topic
//! +-- Publisher
//! |   +-- Writer ------> Topic
//! +-- Subscriber
//! |   +-- Reader <------ Topic
//! |       +-- ReadCondition / QueryCondition
//! +-- GuardCondition
//! +-- Waitset
//! ```

mod allocator;
mod condition;
mod domain_registry;
pub(crate) mod entity;
/// Listener callbacks and communication status values.
pub mod listener;
mod participant;
mod publisher;
/// QoS policy definitions.
pub mod qos;
mod read_condition;
mod reader;
mod retcode;
/// Reader history cache and the read/take engine.
pub mod rhc;
mod subscriber;
mod time;
mod topic;
mod waitset;
mod writer;

pub use allocator::{DataAllocator, LoanBuffer};
pub use condition::{
    create_guardcondition, read_guardcondition, set_guardcondition, take_guardcondition,
    Condition, GuardCondition, StatusCondition, StatusMask,
};
pub use entity::{
    delete, enable, get_children, get_domain_id, get_instance_handle, get_kind, get_listener,
    get_parent, get_participant, get_qos, get_status_changes, get_status_mask, read_status,
    set_listener, set_qos, set_status_mask, take_status, Entity, EntityKind, InstanceHandle,
    HANDLE_NIL,
};
pub use listener::{
    Listener, PublicationMatchedStatus, SampleLostStatus, SampleRejectedReason,
    SampleRejectedStatus, SubscriptionMatchedStatus,
};
pub use participant::{create_participant, lookup_participants};
pub use publisher::create_publisher;
pub use qos::{
    Durability, EntityFactory, History, Qos, Reliability, ReliabilityKind, ResourceLimits,
    WriterDataLifecycle,
};
pub use read_condition::{
    create_querycondition, create_readcondition, get_datareader, get_mask, InstanceStateMask,
    ReadMask, SampleStateMask, ViewStateMask,
};
pub use reader::read::{
    read, read_instance, read_instance_mask, read_instance_mask_wl, read_instance_wl, read_mask,
    read_mask_wl, read_next, read_next_wl, read_wl, readcdr, readcdr_instance, return_loan, take,
    take_instance, take_instance_mask, take_instance_mask_wl, take_instance_wl, take_mask,
    take_mask_wl, take_next, take_next_wl, take_wl, takecdr, takecdr_instance, ReaderLoan,
};
pub use reader::{
    create_reader, get_sample_lost_status, get_sample_rejected_status,
    get_subscription_matched_status,
};
pub use retcode::ReturnCode;
pub use rhc::{InstanceState, SampleInfo, SampleState, ViewState};
pub use subscriber::create_subscriber;
pub use time::{time_now, Time, INFINITY};
pub use topic::{create_topic, create_topic_sertype, find_topic, get_name, get_topic, get_type_name};
pub use waitset::{
    create_waitset, waitset_attach, waitset_detach, waitset_get_entities, waitset_set_trigger,
    waitset_wait, waitset_wait_until, AttachArg,
};
pub use writer::loan::{request_loan, return_writer_loan, write_loan, WriterLoan};
pub use writer::{
    create_writer, dispose, dispose_ih, dispose_ts, get_publication_matched_status,
    instance_get_key, lookup_instance, register_instance, unregister_instance,
    unregister_instance_ih, unregister_instance_ts, wait_for_acks, write, write_cdr, write_ts,
    writedispose, writedispose_ts,
};

use crate::core::handles::HandleError;

/// Errors returned by DDS operations.
///
/// Every variant maps onto exactly one [`ReturnCode`] through
/// [`Error::return_code`].
#[derive(Debug)]
pub enum Error {
    // ========================================================================
    // Usage Errors
    // ========================================================================
    /// Argument rejected (bad buffer size, foreign sample type, invalid key).
    BadParameter(String),
    /// Operation not applicable to this kind of entity.
    IllegalOperation,
    /// The entity was deleted (or is being deleted).
    AlreadyDeleted,
    /// Operation not possible in the current state.
    PreconditionNotMet(String),
    /// Entity exists but has not been enabled yet.
    NotEnabled,
    /// Attempt to change a policy that cannot change once enabled.
    ImmutablePolicy(String),
    /// Policies contradict each other.
    InconsistentPolicy(String),
    /// Feature not supported by this implementation.
    Unsupported,
    /// Writer loan at `index` was not outstanding; earlier slots were returned.
    LoanNotOutstanding { index: usize },

    // ========================================================================
    // Resource Errors
    // ========================================================================
    /// Handle table full or allocation failure.
    OutOfResources,

    // ========================================================================
    // Timing Errors
    // ========================================================================
    /// Blocking operation did not complete in time.
    Timeout,
    /// Nothing to return.
    NoData,

    // ========================================================================
    // Data Errors
    // ========================================================================
    /// (De)serialization of a sample failed.
    Serialization(String),

    // ========================================================================
    // Other Errors
    // ========================================================================
    /// Denied by access control.
    NotAllowedBySecurity,
    /// I/O error with underlying cause.
    Io(std::io::Error),
    /// Unspecified failure.
    Other(String),
}

impl Error {
    /// Return code a C binding would surface for this error.
    #[must_use]
    pub fn return_code(&self) -> ReturnCode {
        match self {
            Error::BadParameter(_) => ReturnCode::BadParameter,
            Error::IllegalOperation => ReturnCode::IllegalOperation,
            Error::AlreadyDeleted => ReturnCode::AlreadyDeleted,
            Error::PreconditionNotMet(_) | Error::LoanNotOutstanding { .. } => {
                ReturnCode::PreconditionNotMet
            }
            Error::NotEnabled => ReturnCode::NotEnabled,
            Error::ImmutablePolicy(_) => ReturnCode::ImmutablePolicy,
            Error::InconsistentPolicy(_) => ReturnCode::InconsistentPolicy,
            Error::Unsupported => ReturnCode::Unsupported,
            Error::OutOfResources => ReturnCode::OutOfResources,
            Error::Timeout => ReturnCode::Timeout,
            Error::NoData => ReturnCode::NoData,
            Error::Serialization(_) => ReturnCode::BadParameter,
            Error::NotAllowedBySecurity => ReturnCode::NotAllowedBySecurity,
            Error::Io(_) | Error::Other(_) => ReturnCode::Error,
        }
    }

    pub(crate) fn bad_param(msg: impl Into<String>) -> Self {
        Error::BadParameter(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::PreconditionNotMet(msg.into())
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            // Usage
            Error::BadParameter(msg) => write!(f, "Bad parameter: {}", msg),
            Error::IllegalOperation => write!(f, "Illegal operation for this entity kind"),
            Error::AlreadyDeleted => write!(f, "Entity already deleted"),
            Error::PreconditionNotMet(msg) => write!(f, "Precondition not met: {}", msg),
            Error::NotEnabled => write!(f, "Entity not enabled"),
            Error::ImmutablePolicy(msg) => write!(f, "Immutable policy: {}", msg),
            Error::InconsistentPolicy(msg) => write!(f, "Inconsistent policy: {}", msg),
            Error::Unsupported => write!(f, "Unsupported operation"),
            Error::LoanNotOutstanding { index } => {
                write!(f, "Loan at index {} is not outstanding", index)
            }
            // Resource
            Error::OutOfResources => write!(f, "Out of resources"),
            // Timing
            Error::Timeout => write!(f, "Timeout"),
            Error::NoData => write!(f, "No data"),
            // Data
            Error::Serialization(msg) => write!(f, "Serialization failed: {}", msg),
            // Other
            Error::NotAllowedBySecurity => write!(f, "Not allowed by security"),
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<HandleError> for Error {
    fn from(e: HandleError) -> Self {
        match e {
            HandleError::Invalid => Error::bad_param("invalid handle"),
            HandleError::Deleted | HandleError::Closed => Error::AlreadyDeleted,
            HandleError::UnequalKind => Error::IllegalOperation,
            HandleError::Timeout => Error::Timeout,
            HandleError::OutOfResources => Error::OutOfResources,
        }
    }
}

impl From<&Error> for ReturnCode {
    fn from(e: &Error) -> Self {
        e.return_code()
    }
}

/// Convenient alias for API results using the public `Error` type.
pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_return_codes() {
        assert_eq!(
            Error::bad_param("x").return_code(),
            ReturnCode::BadParameter
        );
        assert_eq!(
            Error::LoanNotOutstanding { index: 1 }.return_code(),
            ReturnCode::PreconditionNotMet
        );
        assert_eq!(Error::Timeout.return_code().as_i32(), -10);
        assert_eq!(
            Error::Other("boom".into()).return_code(),
            ReturnCode::Error
        );
    }

    #[test]
    fn test_handle_error_mapping() {
        assert!(matches!(
            Error::from(HandleError::Invalid),
            Error::BadParameter(_)
        ));
        assert!(matches!(
            Error::from(HandleError::Closed),
            Error::AlreadyDeleted
        ));
        assert!(matches!(
            Error::from(HandleError::Deleted),
            Error::AlreadyDeleted
        ));
        assert!(matches!(
            Error::from(HandleError::UnequalKind),
            Error::IllegalOperation
        ));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            Error::LoanNotOutstanding { index: 2 }.to_string(),
            "Loan at index 2 is not outstanding"
        );
        assert_eq!(Error::AlreadyDeleted.to_string(), "Entity already deleted");
    }
}
