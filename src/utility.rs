use std::sync::{Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Builds a human readable name out of the pieces a chat user profile has
pub fn format_user_name(first_name: &str, last_name: Option<&str>, username: Option<&str>) -> String {
    let mut name = first_name.trim().to_owned();
    if let Some(last) = last_name.map(str::trim).filter(|l| !l.is_empty()) {
        if !name.is_empty() {
            name.push(' ');
        }
        name.push_str(last);
    }
    match username.filter(|u| !u.is_empty()) {
        Some(handle) if name.is_empty() => format!("@{}", handle),
        Some(handle) => format!("{} (@{})", name, handle),
        None if name.is_empty() => "Unknown".to_owned(),
        None => name,
    }
}

/// `1d 2h 3m 4s`, leading zero units omitted
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, hours, mins, secs) = (secs / 86_400, secs / 3_600 % 24, secs / 60 % 60, secs % 60);
    let mut parts = Vec::new();
    if days > 0 {
        parts.push(format!("{}d", days));
    }
    if days > 0 || hours > 0 {
        parts.push(format!("{}h", hours));
    }
    if days > 0 || hours > 0 || mins > 0 {
        parts.push(format!("{}m", mins));
    }
    parts.push(format!("{}s", secs));
    parts.join(" ")
}

/// Display of an error followed by all of its sources
pub fn error_chain(err: &dyn std::error::Error) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

// A panicked holder does not invalidate the plain data behind these locks

pub fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

pub fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

pub fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_names() {
        assert_eq!(format_user_name("Iaroslav", Some("Sorokin"), None), "Iaroslav Sorokin");
        assert_eq!(format_user_name("Ann", None, Some("ann_k")), "Ann (@ann_k)");
        assert_eq!(format_user_name(" ", None, Some("ghost")), "@ghost");
        assert_eq!(format_user_name("", Some(""), None), "Unknown");
    }

    #[test]
    fn uptimes() {
        assert_eq!(format_uptime(Duration::from_secs(5)), "5s");
        assert_eq!(format_uptime(Duration::from_secs(3_605)), "1h 0m 5s");
        assert_eq!(format_uptime(Duration::from_secs(90_061)), "1d 1h 1m 1s");
    }
}
