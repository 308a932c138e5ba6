#![no_main]

use blockcast_rx::transfer::{Block, ControlMessage, Fragment};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frag) = Fragment::parse(data) {
        assert!(!frag.payload.is_empty());
        let encoded = frag.encode().expect("parsed fragment re-encodes");
        assert_eq!(Fragment::parse(&encoded).expect("reparse"), frag);

        let mut block = Block::new(frag.cycle, frag.block, 4096);
        let _ = block.assemble(&frag);
        assert!(block.filled_bytes() <= 4096);
    }

    if let Ok(msg) = ControlMessage::decode(data) {
        assert_eq!(msg.encode(), data);
    }
});
