//! A convenience wrapper around the `(doc_id, text)` pair `Index::add`
//! takes directly. `spec.md` §1 Non-goals explicitly excludes storing
//! payloads or metadata — the store keeps neither past the add call, so
//! unlike the teacher's `Document` this one carries no `url`/metadata
//! fields to drop.

#[derive(Debug, Clone)]
pub struct Document {
    /// Caller-supplied, non-zero, must fit `u32` for bitmap membership.
    pub id: u64,
    pub text: String,
}

impl Document {
    pub fn new(id: u64, text: impl Into<String>) -> Self {
        Document {
            id,
            text: text.into(),
        }
    }
}
