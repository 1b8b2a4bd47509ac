//! Subagent dispatch: agent resolution, context enrichment, retried worker
//! invocation.

mod dispatcher;
mod memory;

pub use dispatcher::{DispatchLogEntry, SubagentDispatcher, SubagentRunner};
pub use memory::{
    EnrichedContext, Gotcha, GotchasMemory, MemoryContext, MemoryEntry, MemoryQuery, PatternHint,
    ProjectContext,
};
