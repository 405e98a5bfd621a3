//! Context: a membership of peers that can communicate.

pub type Vaddr = u32;
pub type ContextId = u32;

/// A membership of peers that can communicate. A default-constructed
/// `Context` is *invalid* and must not be passed to send/recv/collectives.
///
/// Members are either the contiguous range `[0, size)` (the initial context
/// every bootstrap produces) or an explicit whitelist of vaddrs (a context
/// produced by `split_context`). A peer's own `vaddr` never changes across a
/// split: identity is retained, not renumbered, so a whitelist is exactly
/// the subset of the parent context's vaddrs that voted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    context_id: ContextId,
    vaddr: Vaddr,
    size: usize,
    whitelist: Option<Vec<Vaddr>>,
    valid: bool,
}

impl Default for Context {
    fn default() -> Self {
        Context {
            context_id: 0,
            vaddr: 0,
            size: 0,
            whitelist: None,
            valid: false,
        }
    }
}

impl Context {
    pub(crate) fn new(context_id: ContextId, vaddr: Vaddr, size: usize) -> Self {
        Context {
            context_id,
            vaddr,
            size,
            whitelist: None,
            valid: true,
        }
    }

    /// Builds a context whose membership is an explicit whitelist rather
    /// than `[0, size)`, for a context produced by `split_context`. `vaddr`
    /// is the caller's own vaddr, carried over unchanged from the context
    /// being split.
    pub(crate) fn with_whitelist(context_id: ContextId, vaddr: Vaddr, whitelist: Vec<Vaddr>) -> Self {
        Context {
            context_id,
            vaddr,
            size: whitelist.len(),
            whitelist: Some(whitelist),
            valid: true,
        }
    }

    pub(crate) fn invalid() -> Self {
        Context::default()
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn id(&self) -> ContextId {
        self.context_id
    }

    /// This peer's vaddr within the context. Only meaningful for a valid context.
    pub fn vaddr(&self) -> Vaddr {
        self.vaddr
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// The member vaddrs: `[0, size)` for the initial context, or the
    /// whitelist in ascending order for a split context.
    pub fn members(&self) -> Vec<Vaddr> {
        match &self.whitelist {
            Some(whitelist) => whitelist.clone(),
            None => (0..self.size as Vaddr).collect(),
        }
    }
}
