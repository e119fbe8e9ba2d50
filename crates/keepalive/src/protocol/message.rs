use bytes::{Buf, Bytes};

/// A unit flowing through the codecs: either a message head or a piece of its payload.
///
/// `T` is the head type (request or response head together with its [`PayloadSize`]),
/// `Data` the payload buffer type (defaults to `Bytes`).
pub enum Message<T, Data: Buf = Bytes> {
    /// The head of a message
    Header(T),
    /// A chunk of payload data or the EOF marker
    Payload(PayloadItem<Data>),
}

/// An item of a payload stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayloadItem<Data: Buf = Bytes> {
    /// A chunk of payload data
    Chunk(Data),
    /// Marks the end of the payload
    Eof,
}

/// How the extent of a message body is delimited on the wire.
///
/// This is the framing the reuse decision is made on: only `Length`, `Chunked` and
/// `Empty` tell the reader where the next message starts.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PayloadSize {
    /// `Content-Length` delimited
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// No body at all
    Empty,
    /// Body runs until the peer closes the connection
    UntilClose,
}

impl PayloadSize {
    /// Returns true if the payload uses chunked transfer encoding
    #[inline]
    pub fn is_chunked(&self) -> bool {
        matches!(self, PayloadSize::Chunked)
    }

    /// Returns true if there is no payload, either `Empty` or a zero `Length`
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, PayloadSize::Empty | PayloadSize::Length(0))
    }

    /// Returns true if only a connection close can end the payload
    #[inline]
    pub fn is_close_delimited(&self) -> bool {
        matches!(self, PayloadSize::UntilClose)
    }

    /// The byte count announced up front, if any
    #[inline]
    pub fn declared_length(&self) -> Option<u64> {
        match self {
            PayloadSize::Length(length) => Some(*length),
            PayloadSize::Empty => Some(0),
            PayloadSize::Chunked | PayloadSize::UntilClose => None,
        }
    }
}

impl<T> Message<T> {
    /// Returns true if this message contains payload data
    #[inline]
    pub fn is_payload(&self) -> bool {
        matches!(self, Message::Payload(_))
    }

    /// Returns true if this message contains a head
    #[inline]
    pub fn is_header(&self) -> bool {
        matches!(self, Message::Header(_))
    }

    /// Converts the message into a `PayloadItem`, `None` for a head
    pub fn into_payload_item(self) -> Option<PayloadItem> {
        match self {
            Message::Header(_) => None,
            Message::Payload(payload_item) => Some(payload_item),
        }
    }
}

impl<T> From<Bytes> for Message<T> {
    fn from(bytes: Bytes) -> Self {
        Self::Payload(PayloadItem::Chunk(bytes))
    }
}

impl<D: Buf> PayloadItem<D> {
    /// Returns true if this item marks the end of the payload
    #[inline]
    pub fn is_eof(&self) -> bool {
        matches!(self, PayloadItem::Eof)
    }

    /// Returns true if this item carries data
    #[inline]
    pub fn is_chunk(&self) -> bool {
        matches!(self, PayloadItem::Chunk(_))
    }
}

impl PayloadItem {
    /// The carried bytes, `None` for EOF
    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }

    /// Consumes the item and returns the carried bytes, `None` for EOF
    pub fn into_bytes(self) -> Option<Bytes> {
        match self {
            PayloadItem::Chunk(bytes) => Some(bytes),
            PayloadItem::Eof => None,
        }
    }
}
