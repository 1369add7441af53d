//! Batch data model: tagged items and sealed batches.

/// An item tagged with its submission id.
///
/// Ids are assigned by the pipeline's ingestion entry point from a single
/// monotonically increasing counter. They are unique and strictly increasing
/// for the lifetime of one pipeline instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedItem<T> {
    /// Submission id, starting at 1.
    pub id: u64,
    /// Caller payload.
    pub payload: T,
}

impl<T> TaggedItem<T> {
    pub fn new(id: u64, payload: T) -> Self {
        Self { id, payload }
    }
}

/// Why a batch was flushed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushReason {
    /// The window reached `max_items`.
    Count,
    /// `max_wait` elapsed since the window's first item.
    Time,
    /// Shutdown force-flushed a partial window.
    Forced,
}

impl std::fmt::Display for FlushReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlushReason::Count => write!(f, "count"),
            FlushReason::Time => write!(f, "time"),
            FlushReason::Forced => write!(f, "forced"),
        }
    }
}

/// A sealed, ordered group of tagged items released together.
///
/// Insertion order preserves submission order. A batch is created by the
/// assembler when a window flushes and is immutable from then on; ownership
/// moves assembler → routing queue → exactly one worker → supply caller.
#[derive(Debug, PartialEq, Eq)]
pub struct Batch<T> {
    items: Vec<TaggedItem<T>>,
    reason: FlushReason,
}

impl<T> Batch<T> {
    /// Seal a window into a batch.
    pub(crate) fn seal(items: Vec<TaggedItem<T>>, reason: FlushReason) -> Self {
        Self { items, reason }
    }

    /// The items in submission order.
    pub fn items(&self) -> &[TaggedItem<T>] {
        &self.items
    }

    /// Consume the batch, yielding its items.
    pub fn into_items(self) -> Vec<TaggedItem<T>> {
        self.items
    }

    /// Number of items in the batch.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the batch is empty. Never true for batches the pipeline
    /// emits; windows with zero items are not flushed.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Why this batch was flushed.
    pub fn reason(&self) -> FlushReason {
        self.reason
    }

    /// Ids of the batch's items, in submission order.
    pub fn ids(&self) -> Vec<u64> {
        self.items.iter().map(|item| item.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_preserves_order() {
        let items = vec![
            TaggedItem::new(1, "a"),
            TaggedItem::new(2, "b"),
            TaggedItem::new(3, "c"),
        ];
        let batch = Batch::seal(items, FlushReason::Count);
        assert_eq!(batch.len(), 3);
        assert_eq!(batch.ids(), vec![1, 2, 3]);
        assert_eq!(batch.reason(), FlushReason::Count);
    }

    #[test]
    fn test_into_items() {
        let batch = Batch::seal(vec![TaggedItem::new(7, 42u32)], FlushReason::Time);
        let items = batch.into_items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, 7);
        assert_eq!(items[0].payload, 42);
    }

    #[test]
    fn test_flush_reason_display() {
        assert_eq!(FlushReason::Count.to_string(), "count");
        assert_eq!(FlushReason::Time.to_string(), "time");
        assert_eq!(FlushReason::Forced.to_string(), "forced");
    }
}
