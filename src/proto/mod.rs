//! Protobuf payload model for outbound messages.
//!
//! Only the subset of the `Message` envelope that the relay core inspects or
//! produces is declared here; unknown fields supplied by callers embedding
//! their own payloads survive as encoded bytes on their side of the boundary.

pub mod helpers;

pub mod wa {
    /// The application-level message envelope. Exactly one content field is
    /// normally set; wrappers (`device_sent_message`, `ephemeral_message`,
    /// `view_once_message`, `edited_message`) nest a further envelope.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct Message {
        #[prost(string, optional, tag = "1")]
        pub conversation: ::core::option::Option<String>,
        #[prost(message, optional, tag = "2")]
        pub sender_key_distribution_message: ::core::option::Option<SenderKeyDistributionMessage>,
        #[prost(message, optional, tag = "3")]
        pub image_message: ::core::option::Option<ImageMessage>,
        #[prost(message, optional, tag = "4")]
        pub contact_message: ::core::option::Option<ContactMessage>,
        #[prost(message, optional, tag = "6")]
        pub extended_text_message: ::core::option::Option<ExtendedTextMessage>,
        #[prost(message, optional, tag = "7")]
        pub document_message: ::core::option::Option<DocumentMessage>,
        #[prost(message, optional, tag = "8")]
        pub audio_message: ::core::option::Option<AudioMessage>,
        #[prost(message, optional, tag = "9")]
        pub video_message: ::core::option::Option<VideoMessage>,
        #[prost(message, optional, tag = "13")]
        pub contacts_array_message: ::core::option::Option<ContactsArrayMessage>,
        #[prost(message, optional, tag = "18")]
        pub live_location_message: ::core::option::Option<LiveLocationMessage>,
        #[prost(message, optional, tag = "26")]
        pub sticker_message: ::core::option::Option<StickerMessage>,
        #[prost(message, optional, tag = "30")]
        pub product_message: ::core::option::Option<ProductMessage>,
        #[prost(message, optional, boxed, tag = "31")]
        pub device_sent_message: ::core::option::Option<::prost::alloc::boxed::Box<DeviceSentMessage>>,
        #[prost(message, optional, tag = "36")]
        pub list_message: ::core::option::Option<ListMessage>,
        #[prost(message, optional, boxed, tag = "37")]
        pub view_once_message: ::core::option::Option<::prost::alloc::boxed::Box<FutureProofMessage>>,
        #[prost(message, optional, tag = "38")]
        pub order_message: ::core::option::Option<OrderMessage>,
        #[prost(message, optional, tag = "39")]
        pub list_response_message: ::core::option::Option<ListResponseMessage>,
        #[prost(message, optional, boxed, tag = "40")]
        pub ephemeral_message: ::core::option::Option<::prost::alloc::boxed::Box<FutureProofMessage>>,
        #[prost(message, optional, tag = "42")]
        pub buttons_message: ::core::option::Option<ButtonsMessage>,
        #[prost(message, optional, tag = "43")]
        pub buttons_response_message: ::core::option::Option<ButtonsResponseMessage>,
        #[prost(message, optional, tag = "45")]
        pub interactive_message: ::core::option::Option<InteractiveMessage>,
        #[prost(message, optional, tag = "48")]
        pub interactive_response_message: ::core::option::Option<InteractiveResponseMessage>,
        #[prost(message, optional, tag = "49")]
        pub poll_creation_message: ::core::option::Option<PollCreationMessage>,
        #[prost(message, optional, boxed, tag = "53")]
        pub document_with_caption_message:
            ::core::option::Option<::prost::alloc::boxed::Box<FutureProofMessage>>,
        #[prost(message, optional, boxed, tag = "58")]
        pub edited_message: ::core::option::Option<::prost::alloc::boxed::Box<FutureProofMessage>>,
        #[prost(message, optional, tag = "63")]
        pub pin_in_chat_message: ::core::option::Option<PinInChatMessage>,
        #[prost(message, optional, tag = "70")]
        pub event_message: ::core::option::Option<EventMessage>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct SenderKeyDistributionMessage {
        #[prost(string, optional, tag = "1")]
        pub group_id: ::core::option::Option<String>,
        #[prost(bytes = "vec", optional, tag = "2")]
        pub axolotl_sender_key_distribution_message: ::core::option::Option<Vec<u8>>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DeviceSentMessage {
        #[prost(string, optional, tag = "1")]
        pub destination_jid: ::core::option::Option<String>,
        #[prost(message, optional, boxed, tag = "2")]
        pub message: ::core::option::Option<::prost::alloc::boxed::Box<Message>>,
        #[prost(string, optional, tag = "3")]
        pub phash: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct FutureProofMessage {
        #[prost(message, optional, boxed, tag = "1")]
        pub message: ::core::option::Option<::prost::alloc::boxed::Box<Message>>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ExtendedTextMessage {
        #[prost(string, optional, tag = "1")]
        pub text: ::core::option::Option<String>,
        #[prost(string, optional, tag = "2")]
        pub matched_text: ::core::option::Option<String>,
        #[prost(string, optional, tag = "4")]
        pub canonical_url: ::core::option::Option<String>,
        #[prost(string, optional, tag = "5")]
        pub description: ::core::option::Option<String>,
        #[prost(string, optional, tag = "6")]
        pub title: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ImageMessage {
        #[prost(string, optional, tag = "1")]
        pub url: ::core::option::Option<String>,
        #[prost(string, optional, tag = "2")]
        pub mimetype: ::core::option::Option<String>,
        #[prost(string, optional, tag = "3")]
        pub caption: ::core::option::Option<String>,
        #[prost(bytes = "vec", optional, tag = "4")]
        pub file_sha256: ::core::option::Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "8")]
        pub media_key: ::core::option::Option<Vec<u8>>,
        #[prost(string, optional, tag = "11")]
        pub direct_path: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct VideoMessage {
        #[prost(string, optional, tag = "1")]
        pub url: ::core::option::Option<String>,
        #[prost(string, optional, tag = "2")]
        pub mimetype: ::core::option::Option<String>,
        #[prost(bytes = "vec", optional, tag = "3")]
        pub file_sha256: ::core::option::Option<Vec<u8>>,
        #[prost(uint32, optional, tag = "5")]
        pub seconds: ::core::option::Option<u32>,
        #[prost(string, optional, tag = "7")]
        pub caption: ::core::option::Option<String>,
        #[prost(bool, optional, tag = "8")]
        pub gif_playback: ::core::option::Option<bool>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AudioMessage {
        #[prost(string, optional, tag = "1")]
        pub url: ::core::option::Option<String>,
        #[prost(string, optional, tag = "2")]
        pub mimetype: ::core::option::Option<String>,
        #[prost(bytes = "vec", optional, tag = "3")]
        pub file_sha256: ::core::option::Option<Vec<u8>>,
        #[prost(uint32, optional, tag = "5")]
        pub seconds: ::core::option::Option<u32>,
        #[prost(bool, optional, tag = "6")]
        pub ptt: ::core::option::Option<bool>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct DocumentMessage {
        #[prost(string, optional, tag = "1")]
        pub url: ::core::option::Option<String>,
        #[prost(string, optional, tag = "2")]
        pub mimetype: ::core::option::Option<String>,
        #[prost(string, optional, tag = "3")]
        pub title: ::core::option::Option<String>,
        #[prost(string, optional, tag = "8")]
        pub file_name: ::core::option::Option<String>,
        #[prost(string, optional, tag = "20")]
        pub caption: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ContactMessage {
        #[prost(string, optional, tag = "1")]
        pub display_name: ::core::option::Option<String>,
        #[prost(string, optional, tag = "16")]
        pub vcard: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ContactsArrayMessage {
        #[prost(string, optional, tag = "1")]
        pub display_name: ::core::option::Option<String>,
        #[prost(message, repeated, tag = "2")]
        pub contacts: Vec<ContactMessage>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct LiveLocationMessage {
        #[prost(double, optional, tag = "1")]
        pub degrees_latitude: ::core::option::Option<f64>,
        #[prost(double, optional, tag = "2")]
        pub degrees_longitude: ::core::option::Option<f64>,
        #[prost(string, optional, tag = "6")]
        pub caption: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct StickerMessage {
        #[prost(string, optional, tag = "1")]
        pub url: ::core::option::Option<String>,
        #[prost(bytes = "vec", optional, tag = "2")]
        pub file_sha256: ::core::option::Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "3")]
        pub media_key: ::core::option::Option<Vec<u8>>,
        #[prost(string, optional, tag = "4")]
        pub mimetype: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ProductMessage {
        #[prost(string, optional, tag = "2")]
        pub business_owner_jid: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListMessage {
        #[prost(string, optional, tag = "1")]
        pub title: ::core::option::Option<String>,
        #[prost(string, optional, tag = "2")]
        pub description: ::core::option::Option<String>,
        #[prost(string, optional, tag = "3")]
        pub button_text: ::core::option::Option<String>,
        #[prost(int32, optional, tag = "4")]
        pub list_type: ::core::option::Option<i32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ListResponseMessage {
        #[prost(string, optional, tag = "1")]
        pub title: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct OrderMessage {
        #[prost(string, optional, tag = "1")]
        pub order_id: ::core::option::Option<String>,
        #[prost(int32, optional, tag = "3")]
        pub item_count: ::core::option::Option<i32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ButtonsMessage {
        #[prost(string, optional, tag = "6")]
        pub content_text: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct ButtonsResponseMessage {
        #[prost(string, optional, tag = "1")]
        pub selected_button_id: ::core::option::Option<String>,
        #[prost(string, optional, tag = "2")]
        pub selected_display_text: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct InteractiveMessage {
        #[prost(string, optional, tag = "1")]
        pub body_text: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct InteractiveResponseMessage {
        #[prost(message, optional, tag = "2")]
        pub native_flow_response_message: ::core::option::Option<NativeFlowResponseMessage>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct NativeFlowResponseMessage {
        #[prost(string, optional, tag = "1")]
        pub name: ::core::option::Option<String>,
        #[prost(string, optional, tag = "2")]
        pub params_json: ::core::option::Option<String>,
        #[prost(int32, optional, tag = "3")]
        pub version: ::core::option::Option<i32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PollCreationMessage {
        #[prost(string, optional, tag = "2")]
        pub name: ::core::option::Option<String>,
        #[prost(message, repeated, tag = "3")]
        pub options: Vec<PollOption>,
        #[prost(uint32, optional, tag = "4")]
        pub selectable_options_count: ::core::option::Option<u32>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PollOption {
        #[prost(string, optional, tag = "1")]
        pub option_name: ::core::option::Option<String>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct PinInChatMessage {
        #[prost(message, optional, tag = "1")]
        pub key: ::core::option::Option<MessageKey>,
        #[prost(int32, optional, tag = "2")]
        pub r#type: ::core::option::Option<i32>,
        #[prost(int64, optional, tag = "3")]
        pub sender_timestamp_ms: ::core::option::Option<i64>,
    }

    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct EventMessage {
        #[prost(bool, optional, tag = "2")]
        pub is_canceled: ::core::option::Option<bool>,
        #[prost(string, optional, tag = "3")]
        pub name: ::core::option::Option<String>,
        #[prost(string, optional, tag = "4")]
        pub description: ::core::option::Option<String>,
    }

    /// A message key as referenced by receipts and pin/revoke operations.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct MessageKey {
        #[prost(string, optional, tag = "1")]
        pub remote_jid: ::core::option::Option<String>,
        #[prost(bool, optional, tag = "2")]
        pub from_me: ::core::option::Option<bool>,
        #[prost(string, optional, tag = "3")]
        pub id: ::core::option::Option<String>,
        #[prost(string, optional, tag = "4")]
        pub participant: ::core::option::Option<String>,
    }

    /// The signed device identity distributed alongside pre-key messages.
    #[derive(Clone, PartialEq, ::prost::Message)]
    pub struct AdvSignedDeviceIdentity {
        #[prost(bytes = "vec", optional, tag = "1")]
        pub details: ::core::option::Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "2")]
        pub account_signature_key: ::core::option::Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "3")]
        pub account_signature: ::core::option::Option<Vec<u8>>,
        #[prost(bytes = "vec", optional, tag = "4")]
        pub device_signature: ::core::option::Option<Vec<u8>>,
    }
}
