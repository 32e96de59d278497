//! Data models shared by the local stores and the sync protocol

mod member;
mod member_type;
mod office;
mod visit;

pub use member::Member;
pub use member_type::MemberType;
pub use office::Office;
pub use visit::Visit;
