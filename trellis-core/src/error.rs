//! Error Types
//!
//! This module defines the error taxonomy for the runtime. Structural
//! failures during mounting and diffing are separated from engine-level
//! failures so callers can tell "this view description is invalid" apart
//! from "the runtime loop stopped".

use thiserror::Error;

use crate::tree::NodeId;

/// Errors raised while mounting a view description into the live tree.
#[derive(Debug, Error)]
pub enum MountError {
    /// Component nesting exceeded the configured render depth cap.
    ///
    /// Deep nesting is almost always a component that (directly or
    /// indirectly) renders itself without a terminating condition.
    #[error("render depth cap {max} exceeded while mounting `{component}`")]
    DepthExceeded {
        /// Type name of the component that tripped the cap.
        component: &'static str,
        /// The configured cap.
        max: usize,
    },

    /// A void element (one that cannot have a closing tag) was given
    /// children.
    #[error("void element <{tag}> cannot carry children")]
    VoidWithChildren {
        /// Tag of the offending element.
        tag: String,
    },
}

/// Errors raised while diffing a live subtree against a new description.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The targeted component scope is no longer mounted.
    #[error("component scope {0} is not mounted")]
    StaleScope(NodeId),

    /// The targeted node does not exist in the live tree.
    #[error("node {0} is not mounted")]
    MissingNode(NodeId),

    /// Mounting a fresh subtree during the diff failed.
    #[error(transparent)]
    Mount(#[from] MountError),
}

/// Errors that stop the engine loop.
///
/// Structural failures are not recoverable mid-frame: the live tree and
/// the platform may disagree about what exists, so the loop surfaces the
/// error from [`Engine::run`](crate::engine::Engine::run) instead of
/// continuing with a corrupted tree.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A root mount failed.
    #[error("mount failed: {0}")]
    Mount(#[from] MountError),

    /// A render pass failed.
    #[error("update failed: {0}")]
    Update(#[from] UpdateError),
}

/// Errors raised by storage collaborators.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store refused the write because it is full.
    #[error("storage quota exceeded")]
    QuotaExceeded,

    /// The backing store failed in a host-specific way.
    #[error("storage backend failure: {0}")]
    Backend(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_error_wraps_mount_error() {
        let mount = MountError::VoidWithChildren { tag: "img".into() };
        let update: UpdateError = mount.into();
        assert!(matches!(update, UpdateError::Mount(_)));
        assert_eq!(update.to_string(), "void element <img> cannot carry children");
    }

    #[test]
    fn engine_error_messages_name_the_phase() {
        let err: EngineError = UpdateError::StaleScope(NodeId::from_raw(7)).into();
        assert_eq!(err.to_string(), "update failed: component scope 7 is not mounted");
    }
}
