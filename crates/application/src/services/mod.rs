mod conversation_service;
mod password_reset_service;
mod user_service;

pub use conversation_service::{ConversationService, ConversationServiceDependencies};
pub use password_reset_service::{
    PasswordResetService, PasswordResetServiceDependencies, ResetPasswordRequest,
};
pub use user_service::{
    AuthenticateUserRequest, ProfileImageUpload, RegisterUserRequest, UserService,
    UserServiceDependencies,
};
