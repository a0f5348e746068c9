pub mod dispatch;
pub mod panel;
pub mod reconcile;
pub mod transcript;
pub mod wire;

pub use dispatch::{Dispatcher, Failure, PendingRequest, Reply, RequestPayload};
pub use panel::{
    BindError, InputBuffer, PanelBindings, PanelConfig, PanelController, PanelKind, PanelState,
    SubmitRejected, PENDING_PLACEHOLDER,
};
pub use reconcile::{reconcile, Reconciliation, ERROR_PREFIX, NO_OUTPUT_TEXT, NO_REPLY_TEXT};
pub use transcript::{MessageRecord, RecordId, Role, Transcript};
