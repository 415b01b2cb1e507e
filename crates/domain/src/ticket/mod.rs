//! Helpdesk tickets.

mod entity;
mod events;
mod status;

pub use entity::{NewTicket, Ticket, TicketDetails};
pub use events::{TicketClosedData, TicketCreatedData, TicketEvent, TicketUpdatedData};
pub use status::TicketStatus;
