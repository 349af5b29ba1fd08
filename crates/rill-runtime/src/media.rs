/// Narrow seam to the uploaded-file/media subsystem.
///
/// The run loop only ever needs these two calls; storage layout and
/// eviction policy are the collaborator's business.
pub trait MediaRegistry: Send + Sync {
    /// Drops the given session's references to cached media, called at the
    /// start of every full run.
    fn clear_session_refs(&self, session_id: &str);

    /// Releases files no longer referenced by any session, called after a
    /// full run completes.
    fn remove_orphaned_files(&self);
}

/// Registry for sessions that never touch media.
#[derive(Debug, Default)]
pub struct NullMediaRegistry;

impl MediaRegistry for NullMediaRegistry {
    fn clear_session_refs(&self, _session_id: &str) {}

    fn remove_orphaned_files(&self) {}
}
