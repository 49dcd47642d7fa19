use layer_dispatch::raw::{Message, RawPeer};

/// A plain text message with every optional field unset.
pub fn text_message(id: i32, peer: RawPeer, from: Option<RawPeer>, text: &str) -> Message {
    Message {
        id,
        out:        false,
        mentioned:  false,
        silent:     false,
        post:       false,
        from_id:    from,
        peer_id:    peer,
        reply_to:   None,
        via_bot_id: None,
        date:       0,
        message:    text.to_string(),
        media:      None,
        edit_date:  None,
    }
}
