use serde::{Deserialize, Serialize};

use super::{DetectionSnapshot, SessionController};

/// Inbound control-surface command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlCommand {
    StartDetection,
    StopDetection,
    GetResults,
    /// Host-side element tree mutation hook.
    ElementTreeChanged,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ControlReply {
    Status { status: String },
    Results(Box<DetectionSnapshot>),
    Error { error: String },
}

impl ControlReply {
    fn status(status: &str) -> Self {
        ControlReply::Status {
            status: status.to_string(),
        }
    }
}

pub async fn handle_command(controller: &SessionController, command: ControlCommand) -> ControlReply {
    match command {
        ControlCommand::StartDetection => match controller.start().await {
            Ok(_) => ControlReply::status("started"),
            Err(err) => ControlReply::Error {
                error: format!("{err:#}"),
            },
        },
        ControlCommand::StopDetection => match controller.stop().await {
            Ok(_) => ControlReply::status("stopped"),
            Err(err) => ControlReply::Error {
                error: format!("{err:#}"),
            },
        },
        ControlCommand::GetResults => ControlReply::Results(Box::new(controller.query().await)),
        ControlCommand::ElementTreeChanged => {
            controller.mutation_signal().notify();
            ControlReply::status("acknowledged")
        }
    }
}

/// Parses one JSON line and runs it. Malformed input yields an error reply.
pub async fn handle_line(controller: &SessionController, line: &str) -> ControlReply {
    match serde_json::from_str::<ControlCommand>(line) {
        Ok(command) => handle_command(controller, command).await,
        Err(err) => ControlReply::Error {
            error: format!("unrecognized command: {err}"),
        },
    }
}
