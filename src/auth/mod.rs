//! Users, passwords, sessions and password recovery.

pub mod mailer;
pub mod password;
pub mod recovery;
pub mod session;
pub mod users;

pub use mailer::{LogMailer, MailError, Mailer, OutgoingMail, SmtpMailer};
pub use recovery::{RecoveryError, RecoverySigner, RECOVERY_SALT};
pub use session::{Permission, Session};
pub use users::{UserDirectory, UserError, UserRecord, UserTable};
