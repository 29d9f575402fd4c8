//! The HVML execution runtime: coroutines, the scheduler, the
//! observer/message pipeline, and the renderer/fetcher bridges
//! (`spec.md` §2-§6).

pub mod atom;
pub mod coroutine;
pub mod error;
pub mod exception;
pub mod fetcher_adapter;
pub mod frame;
pub mod message;
pub mod observer;
pub mod renderer_bridge;
pub mod scheduler;
pub mod verbs;

pub use coroutine::{ChildRecord, Coroutine, CoroutineStage, CoroutineState, Exception, ExitPhase, ObserverTask};
pub use error::{RuntimeError, RuntimeResult};
pub use exception::{resolve_exception, ExceptionOutcome};
pub use fetcher_adapter::FetcherAdapter;
pub use frame::{Frame, NextStep, SymbolTable, Template};
pub use message::{Message, MessageType, MoveBuffer, MsgQueue, Target};
pub use observer::{
    HandleOutcome, Observer, ObserverBuilder, ObserverHandler, ObserverRegistry, ObserverSource, StageMask,
    StateMask, SubTypePattern,
};
pub use renderer_bridge::{RendererBridge, RendererConnBinding};
pub use scheduler::Scheduler;
