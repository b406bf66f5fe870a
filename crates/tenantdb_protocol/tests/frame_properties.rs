//! Property tests for the frame codec.

use proptest::prelude::*;
use tenantdb_protocol::{
    decode_frame, encode_frame, CursorRef, ProtocolMessage, TransactionAck, FRAME_HEADER_LEN,
};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn arbitrary_bytes_never_panic(bytes in prop::collection::vec(any::<u8>(), 0..64)) {
        let _ = decode_frame(&bytes);
    }

    #[test]
    fn cursor_ids_survive_framing(cursor_id in any::<u64>()) {
        let message = ProtocolMessage::PullQueryBatch(CursorRef { cursor_id });
        let frame = encode_frame(&message).unwrap();
        let (decoded, used) = decode_frame(&frame).unwrap();
        prop_assert_eq!(used, frame.len());
        prop_assert_eq!(decoded, message);
    }

    #[test]
    fn trailing_bytes_are_left_alone(level in any::<u64>(), extra in prop::collection::vec(any::<u8>(), 0..16)) {
        let mut frame = encode_frame(&ProtocolMessage::TransactionAck(TransactionAck { level })).unwrap();
        let frame_len = frame.len();
        frame.extend_from_slice(&extra);
        let (_, used) = decode_frame(&frame).unwrap();
        prop_assert_eq!(used, frame_len);
        prop_assert!(used >= FRAME_HEADER_LEN);
    }
}
