//! Presentation collaborator: approval gate plus message/status delivery.

use std::future::Future;

use chat_core::PeerIdentity;
use tokio::sync::{mpsc, oneshot};

/// What the engine needs from whoever shows the chat.
pub trait Presenter: Send + Sync + 'static {
    /// Yes/no on an inbound peer. Awaited on the acceptor task only; the listener keeps running.
    fn request_approval(&self, candidate: &PeerIdentity) -> impl Future<Output = bool> + Send;

    /// Already-formatted chat line from the peer, in wire order.
    fn on_message(&self, line: &str);

    /// State/status notice.
    fn on_status(&self, line: &str);
}

/// Pending yes/no question for the shell.
#[derive(Debug)]
pub struct ApprovalRequest {
    pub peer: PeerIdentity,
    pub reply: oneshot::Sender<bool>,
}

/// Prints to stdout; forwards approval questions to the shell loop that owns stdin.
pub struct TerminalPresenter {
    approvals: mpsc::UnboundedSender<ApprovalRequest>,
    auto_accept: bool,
}

impl TerminalPresenter {
    pub fn new(auto_accept: bool) -> (Self, mpsc::UnboundedReceiver<ApprovalRequest>) {
        let (approvals, rx) = mpsc::unbounded_channel();
        (
            Self {
                approvals,
                auto_accept,
            },
            rx,
        )
    }
}

impl Presenter for TerminalPresenter {
    async fn request_approval(&self, candidate: &PeerIdentity) -> bool {
        if self.auto_accept {
            self.on_status(&format!("{candidate} is trying to connect (auto-accepted)."));
            return true;
        }
        let (reply, answer) = oneshot::channel();
        let request = ApprovalRequest {
            peer: candidate.clone(),
            reply,
        };
        if self.approvals.send(request).is_err() {
            // Shell is gone; nobody can say yes.
            return false;
        }
        answer.await.unwrap_or(false)
    }

    fn on_message(&self, line: &str) {
        println!("{line}");
    }

    fn on_status(&self, line: &str) {
        println!("* {line}");
    }
}
