//! Pre-flight checks for the sign-up, sign-in and reset forms.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

/// A failed check. `Display` is the message shown next to the field.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{0}")]
pub struct ValidationError(pub &'static str);

pub const MAX_EMAIL_LEN: usize = 254;
pub const MIN_PASSWORD_LEN: usize = 8;
pub const MAX_PASSWORD_LEN: usize = 128;

const SPECIAL_CHARS: &str = "!@#$%^&*()_+-=[]{};':\"\\|,.<>/?";

const COMMON_PASSWORDS: &[&str] = &[
    "password",
    "12345678",
    "qwerty123",
    "abc123456",
    "password123",
    "admin123",
    "letmein123",
    "welcome123",
    "monkey123",
    "dragon123",
    "sunshine123",
    "iloveyou123",
    "princess123",
    "rockyou123",
    "123456789",
];

const SEQUENCES: &[&str] = &[
    "123456789",
    "abcdefghijklmnopqrstuvwxyz",
    "qwertyuiop",
    "asdfghjkl",
    "zxcvbnm",
];

fn email_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| {
            Regex::new(
                r"^[a-zA-Z0-9+._%\-]{1,256}@[a-zA-Z0-9][a-zA-Z0-9\-]{0,64}(\.[a-zA-Z0-9][a-zA-Z0-9\-]{0,25})+$",
            )
            .map_err(|e| log::error!("Invalid email pattern: {}", e))
            .ok()
        })
        .as_ref()
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = email.trim();
    if email.is_empty() {
        return Err(ValidationError("Email is required"));
    }
    if email.chars().count() > MAX_EMAIL_LEN {
        return Err(ValidationError("Email is too long"));
    }
    match email_pattern() {
        Some(re) if re.is_match(email) => Ok(()),
        _ => Err(ValidationError("Please enter a valid email address")),
    }
}

fn is_special(c: char) -> bool {
    SPECIAL_CHARS.contains(c)
}

fn has_sequential_run(password: &str) -> bool {
    let lower = password.to_lowercase();
    SEQUENCES.iter().any(|seq| {
        let chars: Vec<char> = seq.chars().collect();
        chars
            .windows(4)
            .any(|w| lower.contains(&w.iter().collect::<String>()))
    })
}

// Three or more of the same character in a row.
fn has_repeating_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

/// Full password policy used at registration. The first failing rule wins.
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError("Password is required"));
    }
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return Err(ValidationError("Password must be at least 8 characters long"));
    }
    if len > MAX_PASSWORD_LEN {
        return Err(ValidationError("Password is too long (max 128 characters)"));
    }
    if !password.chars().any(|c| c.is_uppercase()) {
        return Err(ValidationError("Password must contain at least one uppercase letter"));
    }
    if !password.chars().any(|c| c.is_lowercase()) {
        return Err(ValidationError("Password must contain at least one lowercase letter"));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(ValidationError("Password must contain at least one number"));
    }
    if !password.chars().any(is_special) {
        return Err(ValidationError("Password must contain at least one special character (!@#$%^&*)"));
    }
    let lower = password.to_lowercase();
    if COMMON_PASSWORDS.iter().any(|p| *p == lower) {
        return Err(ValidationError("This password is too common. Please choose a stronger password"));
    }
    if has_sequential_run(password) {
        return Err(ValidationError("Password cannot contain sequential characters (e.g., 123, abc)"));
    }
    if has_repeating_run(password) {
        return Err(ValidationError("Password cannot contain more than 2 repeating characters"));
    }
    Ok(())
}

pub fn validate_password_confirmation(password: &str, confirmation: &str) -> Result<(), ValidationError> {
    if confirmation.is_empty() {
        return Err(ValidationError("Please confirm your password"));
    }
    if password != confirmation {
        return Err(ValidationError("Passwords do not match"));
    }
    Ok(())
}

// Sign-in only checks presence and a minimal length; the full policy is for new passwords.
pub fn validate_login_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError("Password is required"));
    }
    if password.chars().count() < 6 {
        return Err(ValidationError("Password is too short"));
    }
    Ok(())
}

/// Non-blank check for free-form fields.
pub fn validate_required(value: &str, message: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError(message))
    } else {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
    VeryStrong,
}

impl PasswordStrength {
    pub fn label(&self) -> &'static str {
        match self {
            PasswordStrength::Weak => "Weak",
            PasswordStrength::Medium => "Medium",
            PasswordStrength::Strong => "Strong",
            PasswordStrength::VeryStrong => "Very Strong",
        }
    }
}

pub fn password_strength(password: &str) -> PasswordStrength {
    let len = password.chars().count();
    if len < MIN_PASSWORD_LEN {
        return PasswordStrength::Weak;
    }

    let mut score = 0;
    if len >= 12 {
        score += 2;
    } else if len >= 10 {
        score += 1;
    }
    if password.chars().any(|c| c.is_uppercase()) {
        score += 1;
    }
    if password.chars().any(|c| c.is_lowercase()) {
        score += 1;
    }
    if password.chars().any(|c| c.is_ascii_digit()) {
        score += 1;
    }
    if password.chars().any(is_special) {
        score += 1;
    }
    if len >= 16 && score >= 4 {
        score += 1;
    }

    match score {
        s if s >= 7 => PasswordStrength::VeryStrong,
        s if s >= 5 => PasswordStrength::Strong,
        s if s >= 3 => PasswordStrength::Medium,
        _ => PasswordStrength::Weak,
    }
}
