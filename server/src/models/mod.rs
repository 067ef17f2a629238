pub mod event;
pub mod payment;
pub mod reservation;
pub mod ticket;

pub use event::{
    CreateEventRequest, CreateTierRequest, CreatedEvent, Event, TicketTier, TierAvailability,
};
pub use payment::{PaymentRequest, PaymentReceipt};
pub use reservation::{
    Reservation, ReservationHandle, ReservationRequest, ReservationSummary, ReserveTicketsBody,
};
pub use ticket::TicketUnit;
