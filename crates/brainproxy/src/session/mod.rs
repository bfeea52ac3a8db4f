//! Conversation state and the per-turn tool loop.
//!
//! ```text
//!  ┌──────────────┐  history   ┌────────────┐  generate  ┌──────────┐
//!  │ SessionStore │───────────▶│  TurnLoop  │───────────▶│ Provider │
//!  │ (id → turns) │◀───────────│ (state     │◀───────────│          │
//!  └──────────────┘  new turns │  machine)  │            └──────────┘
//!                              └─────┬──────┘
//!                                    │ function calls
//!                                    ▼
//!                              ┌────────────┐
//!                              │ToolExecutor│
//!                              └────────────┘
//! ```
//!
//! The store lock is held only to read or write a history. With
//! serialization enabled, a per-session guard spans the whole turn so two
//! requests on one session never interleave.

mod store;
mod turn_loop;

pub use store::SessionStore;
pub use turn_loop::{
    DEGRADED_PREFIX, EMPTY_RESPONSE_WARNING, TurnError, TurnEvent, TurnLoop, TurnOutcome,
    TurnPlan, TurnState,
};
