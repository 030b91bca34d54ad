//! Backend endpoint paths, relative to the configured API base URL.

// Auth & users
pub const REGISTER: &str = "/users/register/";
pub const SEND_OTP: &str = "/users/send-otp/";
pub const VERIFY_OTP: &str = "/users/verify-otp/";
pub const LOGIN: &str = "/users/login/";
pub const TOKEN_REFRESH: &str = "/users/token/refresh/";
pub const USER_ME: &str = "/users/me/";
pub const USER_PROFILE: &str = "/users/profile/";
pub const CHANGE_PASSWORD: &str = "/users/change-password/";
pub const UNIVERSITIES: &str = "/users/universities/";
pub const CAMPUSES: &str = "/users/campuses/";

// Password reset
pub const PASSWORD_RESET_SEND_OTP: &str = "/users/password-reset/send-otp/";
pub const PASSWORD_RESET_VERIFY_OTP: &str = "/users/password-reset/verify-otp/";
pub const PASSWORD_RESET: &str = "/users/password-reset/";

// Products
pub const PRODUCTS: &str = "/products/";

pub fn product_detail(id: i64) -> String {
    format!("/products/{id}/")
}

pub fn product_ratings(id: i64) -> String {
    format!("/products/{id}/ratings/")
}

// Wishlist
pub const WISHLIST: &str = "/users/wishlist/";

pub fn wishlist_item(product_id: i64) -> String {
    format!("/users/wishlist/{product_id}/")
}

// Orders
pub const ORDERS: &str = "/orders/";
pub const PAYSTACK_INIT: &str = "/orders/paystack-init/";
pub const VERIFY_PAYMENT: &str = "/orders/verify-payment/";

pub fn order_detail(id: i64) -> String {
    format!("/orders/{id}/")
}

// Messaging
pub const MESSAGE_THREADS: &str = "/messaging/threads/";
pub const MESSAGES: &str = "/messaging/messages/";

pub fn message_thread_detail(id: i64) -> String {
    format!("/messaging/threads/{id}/")
}

pub fn mark_thread_read(id: i64) -> String {
    format!("/messaging/threads/{id}/mark_read/")
}

// Notifications
pub const NOTIFICATIONS: &str = "/users/notifications/";
pub const SAVE_PUSH_TOKEN: &str = "/users/push-tokens/";
pub const REMOVE_PUSH_TOKEN: &str = "/users/push-tokens/remove/";
pub const MARK_ALL_NOTIFICATIONS_READ: &str = "/users/notifications/mark-all-read/";

pub fn notification_detail(id: i64) -> String {
    format!("/users/notifications/{id}/")
}

pub fn mark_notification_read(id: i64) -> String {
    format!("/users/notifications/{id}/mark-read/")
}
