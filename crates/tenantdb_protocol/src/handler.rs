//! Message handler seam.

use crate::messages::ProtocolMessage;

/// Something that answers protocol messages for one connection.
///
/// One-way messages (exit, cursor close) yield `None`; every other request
/// yields exactly one response. Handlers are driven by a single connection,
/// so requests never overlap.
pub trait MessageHandler {
    /// Handles one request.
    fn handle(&mut self, message: ProtocolMessage) -> Option<ProtocolMessage>;
}

impl<H: MessageHandler + ?Sized> MessageHandler for Box<H> {
    fn handle(&mut self, message: ProtocolMessage) -> Option<ProtocolMessage> {
        (**self).handle(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{MessageType, TransactionAck};

    struct Depth(u64);

    impl MessageHandler for Depth {
        fn handle(&mut self, message: ProtocolMessage) -> Option<ProtocolMessage> {
            if message.message_type().is_one_way() {
                return None;
            }
            self.0 += 1;
            Some(ProtocolMessage::TransactionAck(TransactionAck { level: self.0 }))
        }
    }

    #[test]
    fn boxed_handlers_delegate() {
        let mut handler: Box<dyn MessageHandler> = Box::new(Depth(0));
        let reply = handler.handle(ProtocolMessage::StartTransaction).unwrap();
        assert_eq!(reply.message_type(), MessageType::TransactionAck);
        assert!(handler.handle(ProtocolMessage::ExitContext).is_none());
    }
}
