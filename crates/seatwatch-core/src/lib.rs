//! seatwatch-core - domain model, upstream client and shared capabilities
//!
//! This crate provides:
//! - The watch/lesson/seat data model and the upstream protocol codes
//! - A typed client for the booking provider's session-cookie web API
//! - Encryption of credentials and sessions at rest
//! - The persistence traits the watch pipeline is written against
//! - Configuration loading

pub mod config;
pub mod crypto;
pub mod protocol;
pub mod session;
pub mod store;
pub mod types;
pub mod upstream;

pub use config::Config;
pub use crypto::{AesGcmCipher, Cipher, CipherError};
pub use protocol::{ModalType, ReservationAttempt, ResultCode, TicketType};
pub use session::{SessionError, SessionManager};
pub use store::{CredentialStore, LessonStore, SealedSession, WatchStore};
pub use types::{
    Lesson, LessonKey, NewWatch, PendingWatch, Seat, SeatMap, SeatNo, SeatStatus, StoreDay,
    UpstreamCredential, UpstreamSession, WatchEntry,
};
pub use upstream::{BookingApi, CatalogApi, ObservedLesson, UpstreamClient, UpstreamError};
