pub mod booking;
pub mod equipment;
pub mod ops;
pub mod payment;
pub mod payout;
pub mod review;
pub mod user;

pub use booking::{
    BookingListResponse, BookingStatus, CreateBookingRequest, Party, PaymentStatus,
    RentalBooking,
};
pub use equipment::{
    CreateEquipmentRequest, Equipment, EquipmentCategory, EquipmentImage,
    EquipmentListResponse, EquipmentQuery, EquipmentStatus, FuelType, ServiceArea,
    UpdateEquipmentRequest,
};
pub use ops::{
    Channel, CreateMaintenanceLogRequest, CreateTicketRequest, MaintenanceLog,
    Notification, SupportTicket, TicketPriority, TicketStatus,
};
pub use payment::{
    CreatePaymentRequest, LedgerTotals, Payment, PaymentMethod, PaymentType,
};
pub use payout::{OperatorPayout, PayoutBreakdown, PayoutStatus};
pub use review::{BookingReview, CreateReviewRequest};
pub use user::{
    CreateFarmerProfileRequest, CreateOperatorProfileRequest, CreateUserRequest,
    FarmerProfile, OperatorProfile, Role, User,
};
