use crate::types::message::MediaType;

use super::wa;

/// Extension helpers over the message envelope.
pub trait MessageExt {
    /// Recursively unwraps device-sent/ephemeral/view-once/document-with-caption/edited
    /// wrappers to reach the content message.
    fn get_base_message(&self) -> &wa::Message;

    /// The primary text content, when the message carries one.
    fn text_content(&self) -> Option<&str>;

    /// The `type` attribute of the resulting `<message>` stanza.
    fn stanza_type(&self) -> &'static str;

    /// The `mediatype` attribute for the `<enc>` envelope, if any.
    fn media_type(&self) -> Option<MediaType>;

    /// Whether the stanza needs a `<biz>` business node (interactive,
    /// buttons and list payloads).
    fn needs_biz_node(&self) -> bool;
}

impl MessageExt for wa::Message {
    fn get_base_message(&self) -> &wa::Message {
        let mut current = self;
        if let Some(msg) = self
            .device_sent_message
            .as_ref()
            .and_then(|m| m.message.as_deref())
        {
            current = msg;
        }
        if let Some(msg) = current
            .ephemeral_message
            .as_ref()
            .and_then(|m| m.message.as_deref())
        {
            current = msg;
        }
        if let Some(msg) = current
            .view_once_message
            .as_ref()
            .and_then(|m| m.message.as_deref())
        {
            current = msg;
        }
        if let Some(msg) = current
            .document_with_caption_message
            .as_ref()
            .and_then(|m| m.message.as_deref())
        {
            current = msg;
        }
        if let Some(msg) = current
            .edited_message
            .as_ref()
            .and_then(|m| m.message.as_deref())
        {
            current = msg;
        }
        current
    }

    fn text_content(&self) -> Option<&str> {
        let base = self.get_base_message();
        if let Some(text) = &base.conversation {
            if !text.is_empty() {
                return Some(text);
            }
        }
        base.extended_text_message
            .as_ref()
            .and_then(|ext| ext.text.as_deref())
    }

    fn stanza_type(&self) -> &'static str {
        let base = self.get_base_message();
        if base.poll_creation_message.is_some() {
            "poll"
        } else if base.event_message.is_some() {
            "event"
        } else {
            "text"
        }
    }

    fn media_type(&self) -> Option<MediaType> {
        let base = self.get_base_message();
        if base.image_message.is_some() {
            Some(MediaType::Image)
        } else if let Some(video) = &base.video_message {
            if video.gif_playback() {
                Some(MediaType::Gif)
            } else {
                Some(MediaType::Video)
            }
        } else if let Some(audio) = &base.audio_message {
            if audio.ptt() {
                Some(MediaType::Ptt)
            } else {
                Some(MediaType::Audio)
            }
        } else if base.contact_message.is_some() {
            Some(MediaType::Vcard)
        } else if base.document_message.is_some() {
            Some(MediaType::Document)
        } else if base.contacts_array_message.is_some() {
            Some(MediaType::ContactArray)
        } else if base.live_location_message.is_some() {
            Some(MediaType::LiveLocation)
        } else if base.sticker_message.is_some() {
            Some(MediaType::Sticker)
        } else if base.list_message.is_some() {
            Some(MediaType::List)
        } else if base.list_response_message.is_some() {
            Some(MediaType::ListResponse)
        } else if base.buttons_response_message.is_some() {
            Some(MediaType::ButtonsResponse)
        } else if base.order_message.is_some() {
            Some(MediaType::Order)
        } else if base.product_message.is_some() {
            Some(MediaType::Product)
        } else if base
            .interactive_response_message
            .as_ref()
            .is_some_and(|i| i.native_flow_response_message.is_some())
        {
            Some(MediaType::NativeFlowResponse)
        } else if base
            .extended_text_message
            .as_ref()
            .is_some_and(|ext| ext.canonical_url.is_some())
        {
            Some(MediaType::Url)
        } else {
            None
        }
    }

    fn needs_biz_node(&self) -> bool {
        let base = self.get_base_message();
        base.interactive_message.is_some()
            || base.buttons_message.is_some()
            || base.list_message.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(body: &str) -> wa::Message {
        wa::Message {
            conversation: Some(body.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn base_message_unwraps_device_sent() {
        let inner = text("hello");
        let wrapped = wa::Message {
            device_sent_message: Some(Box::new(wa::DeviceSentMessage {
                destination_jid: Some("x@s.whatsapp.net".into()),
                message: Some(Box::new(inner.clone())),
                phash: Some(String::new()),
            })),
            ..Default::default()
        };
        assert_eq!(wrapped.get_base_message(), &inner);
        assert_eq!(wrapped.text_content(), Some("hello"));
    }

    #[test]
    fn base_message_unwraps_ephemeral() {
        let inner = text("vanishing");
        let wrapped = wa::Message {
            ephemeral_message: Some(Box::new(wa::FutureProofMessage {
                message: Some(Box::new(inner.clone())),
            })),
            ..Default::default()
        };
        assert_eq!(wrapped.get_base_message(), &inner);
    }

    #[test]
    fn stanza_type_dispatch() {
        assert_eq!(text("hi").stanza_type(), "text");

        let poll = wa::Message {
            poll_creation_message: Some(wa::PollCreationMessage {
                name: Some("lunch?".into()),
                options: vec![],
                selectable_options_count: Some(1),
            }),
            ..Default::default()
        };
        assert_eq!(poll.stanza_type(), "poll");

        let event = wa::Message {
            event_message: Some(wa::EventMessage {
                is_canceled: None,
                name: Some("standup".into()),
                description: None,
            }),
            ..Default::default()
        };
        assert_eq!(event.stanza_type(), "event");
    }

    #[test]
    fn media_type_gif_and_ptt_variants() {
        let gif = wa::Message {
            video_message: Some(wa::VideoMessage {
                gif_playback: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(gif.media_type(), Some(MediaType::Gif));

        let ptt = wa::Message {
            audio_message: Some(wa::AudioMessage {
                ptt: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(ptt.media_type(), Some(MediaType::Ptt));

        assert_eq!(text("plain").media_type(), None);
    }
}
