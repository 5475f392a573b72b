/// Tag byte prepended to every outbound WebSocket binary message.
pub const TAG_VIDEO: u8 = 0x01;

/// Tag byte prepended to every outbound WebSocket binary message carrying audio.
pub const TAG_AUDIO: u8 = 0x02;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_distinct() {
        assert_ne!(TAG_VIDEO, TAG_AUDIO);
    }
}
