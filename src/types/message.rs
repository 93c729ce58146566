use serde::Serialize;

/// How a conversation addresses its members on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AddressingMode {
    Pn,
    Lid,
}

impl AddressingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pn => "pn",
            Self::Lid => "lid",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pn" => Some(Self::Pn),
            "lid" => Some(Self::Lid),
            _ => None,
        }
    }
}

/// The `edit` stanza attribute. Pin-in-chat sends additionally mark their
/// `<enc>` payload with `decrypt-fail="hide"`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub enum EditAttribute {
    #[default]
    Empty,
    MessageEdit,
    PinInChat,
    SenderRevoke,
    AdminRevoke,
}

impl EditAttribute {
    pub fn to_string_val(&self) -> &'static str {
        match self {
            Self::Empty => "",
            Self::MessageEdit => "1",
            Self::PinInChat => "2",
            Self::SenderRevoke => "7",
            Self::AdminRevoke => "8",
        }
    }

    /// Whether recipients should hide the message on decrypt failure instead
    /// of surfacing a placeholder.
    pub fn hides_decrypt_failure(&self) -> bool {
        !matches!(self, Self::Empty)
    }
}

/// The `mediatype` attribute carried on `<enc>` / `<plaintext>` nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MediaType {
    Image,
    Video,
    Gif,
    Ptt,
    Audio,
    Vcard,
    Document,
    ContactArray,
    LiveLocation,
    Sticker,
    List,
    ListResponse,
    ButtonsResponse,
    Order,
    Product,
    NativeFlowResponse,
    Url,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Gif => "gif",
            Self::Ptt => "ptt",
            Self::Audio => "audio",
            Self::Vcard => "vcard",
            Self::Document => "document",
            Self::ContactArray => "contact_array",
            Self::LiveLocation => "livelocation",
            Self::Sticker => "sticker",
            Self::List => "list",
            Self::ListResponse => "list_response",
            Self::ButtonsResponse => "buttons_response",
            Self::Order => "order",
            Self::Product => "product",
            Self::NativeFlowResponse => "native_flow_response",
            Self::Url => "url",
        }
    }
}
