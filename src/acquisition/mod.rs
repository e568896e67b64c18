//! Per-camera acquisition
//!
//! The detection feed subscription and the video session. Both reconnect on
//! their own through a [`ReconnectSlot`] and report health as events.

pub mod detection_feed;
pub mod reconnect;
pub mod stream_session;

pub use detection_feed::{
    subscribe, FeedConnection, FeedError, FeedEvent, FeedMessage, FeedSubscription, FeedTiming,
    FeedTransport, WsTransport,
};
pub use reconnect::ReconnectSlot;
pub use stream_session::{
    HttpSignaling, PeerEvent, PeerFactory, ProbePeer, ProbePeerFactory, SessionDescription,
    Signaling, StreamHandle, TrackInfo, TransportError, VideoPeer,
};
