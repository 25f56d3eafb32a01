use crate::error::{CoreError, CoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Staff,
    Student,
}

impl Role {
    /// `professor` and `secretaria` are the staff roles of the identity provider.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staff" | "professor" | "secretaria" => Some(Self::Staff),
            "student" | "aluno" => Some(Self::Student),
            _ => None,
        }
    }
}

/// Capability of whoever issued the request, as supplied by the identity layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub role: Role,
}

impl Caller {
    pub fn staff() -> Self {
        Self { role: Role::Staff }
    }

    pub fn student() -> Self {
        Self { role: Role::Student }
    }

    pub fn is_staff(self) -> bool {
        self.role == Role::Staff
    }

    pub fn require_staff(self, what: &str) -> CoreResult<()> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(CoreError::unauthorized(format!("{} requires a staff role", what)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staff_aliases_grant_the_capability() {
        for raw in ["staff", "Professor", "secretaria"] {
            assert_eq!(Role::parse(raw), Some(Role::Staff));
        }
        assert_eq!(Role::parse("aluno"), Some(Role::Student));
        assert_eq!(Role::parse("admin"), None);
        assert!(Caller::staff().require_staff("class history").is_ok());
        assert_eq!(
            Caller::student().require_staff("class history").unwrap_err().code(),
            "unauthorized"
        );
    }
}
