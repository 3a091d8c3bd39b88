pub mod paypal;
pub mod twocheckout;
