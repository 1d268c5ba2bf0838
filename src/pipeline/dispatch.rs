//! Commands embedded in replies.
//!
//! A reply may ask the host to run a command by wrapping it in the command
//! tag (`<COMMAND>/weather tokyo</COMMAND>`). The regions are cut out of the
//! outbound text and handed to a [`CommandSink`].

use super::hooks::{OutboundMessage, PreDeliveryHook};
use crate::error::ConfigError;
use crate::guard::recorder::RequestContext;
use crate::guard::validator::markers::{NormalizedText, TagPattern};
use std::future::Future;
use std::pin::Pin;
use tokio::sync::mpsc;

pub const COMMAND_DISPATCH_PRIORITY: i32 = 4;

/// A command lifted from a reply, addressed to the session that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedCommand {
    pub session_id: String,
    pub command: String,
}

/// Where extracted commands go. Submission must not block.
pub trait CommandSink: Send + Sync + std::fmt::Debug {
    fn submit(&self, command: QueuedCommand) -> anyhow::Result<()>;
}

/// Bounded queue the host drains like ordinary user input.
#[derive(Debug, Clone)]
pub struct ChannelCommandSink {
    tx: mpsc::Sender<QueuedCommand>,
}

impl ChannelCommandSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<QueuedCommand>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl CommandSink for ChannelCommandSink {
    fn submit(&self, command: QueuedCommand) -> anyhow::Result<()> {
        self.tx
            .try_send(command)
            .map_err(|e| anyhow::anyhow!("command queue rejected submission: {e}"))
    }
}

/// Split `text` into the commands it carries and the text without them.
pub fn extract_commands(tag: &TagPattern, text: &str) -> (Vec<String>, String) {
    let normalized = NormalizedText::new(text);
    let commands = tag
        .regions(&normalized)
        .into_iter()
        .map(|(_, content)| text[content].split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|command| !command.is_empty())
        .collect();
    (commands, tag.strip_regions(text))
}

#[derive(Debug)]
pub struct CommandDispatcher {
    tag: TagPattern,
    sink: std::sync::Arc<dyn CommandSink>,
    failure_reply: Option<String>,
}

impl CommandDispatcher {
    pub fn new(
        command_tag: &str,
        sink: std::sync::Arc<dyn CommandSink>,
        failure_reply: Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            tag: TagPattern::new(command_tag)?,
            sink,
            failure_reply: failure_reply.filter(|reply| !reply.is_empty()),
        })
    }

    fn dispatch(&self, ctx: &RequestContext, message: &mut OutboundMessage) {
        let (commands, cleaned) = extract_commands(&self.tag, &message.text);
        if commands.is_empty() {
            return;
        }
        let mut failed = false;
        for command in commands {
            tracing::info!(session = %ctx.session_id, %command, "dispatching embedded command");
            if let Err(error) = self.sink.submit(QueuedCommand {
                session_id: ctx.session_id.clone(),
                command: command.clone(),
            }) {
                tracing::warn!(session = %ctx.session_id, %command, %error, "command hand-off failed");
                failed = true;
            }
        }

        let mut text = cleaned.trim().to_string();
        if failed && let Some(reply) = &self.failure_reply {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(reply);
        }
        message.text = text;
    }
}

impl PreDeliveryHook for CommandDispatcher {
    fn name(&self) -> &str {
        "command_dispatch"
    }

    fn priority(&self) -> i32 {
        COMMAND_DISPATCH_PRIORITY
    }

    fn on_delivery<'a>(
        &'a self,
        ctx: &'a RequestContext,
        message: &'a mut OutboundMessage,
    ) -> Pin<Box<dyn Future<Output = ()> + Send + 'a>> {
        Box::pin(async move {
            if message.from_llm && !message.is_empty() {
                self.dispatch(ctx, message);
            }
        })
    }
}
