use async_trait::async_trait;
use harvester_core::{SortOrder, Target};

use crate::{RawItem, RevealOutcome, SourceError};

/// A paginated or infinitely scrolling content surface.
///
/// The adapter owns a live view the controller does not control the lifecycle
/// of. Every call is a suspension point.
#[async_trait]
pub trait SourceAdapter: Send {
    /// Navigate to the target and wait for the content container.
    async fn open(&mut self) -> Result<(), SourceError>;

    /// Items currently visible, in display order.
    async fn current_items(&mut self) -> Result<Vec<RawItem>, SourceError>;

    async fn reveal_more(&mut self) -> Result<RevealOutcome, SourceError>;

    /// Best effort. Returns whether the order is now enforced.
    async fn apply_ordering(&mut self, _order: SortOrder) -> Result<bool, SourceError> {
        Ok(false)
    }

    /// Drop an accepted item from the live view. Returns false when the
    /// source cannot mutate its view.
    async fn remove_item(&mut self, _item: &RawItem) -> Result<bool, SourceError> {
        Ok(false)
    }

    /// Trigger a control inside the item (e.g. "show more") and return the
    /// refreshed snapshot, or `None` if the control is absent or unsupported.
    async fn activate(
        &mut self,
        _item: &RawItem,
        _control: &str,
    ) -> Result<Option<RawItem>, SourceError> {
        Ok(None)
    }
}

/// Builds an independent adapter per session.
pub trait SourceFactory: Send + Sync {
    fn create(&self, target: &Target) -> Result<Box<dyn SourceAdapter>, SourceError>;
}

impl<F> SourceFactory for F
where
    F: Fn(&Target) -> Result<Box<dyn SourceAdapter>, SourceError> + Send + Sync,
{
    fn create(&self, target: &Target) -> Result<Box<dyn SourceAdapter>, SourceError> {
        self(target)
    }
}
