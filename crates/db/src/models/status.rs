//! Status helper enums mapping to SMALLINT lookup tables.
//!
//! Each enum variant's discriminant matches the seed data order (1-based)
//! in the corresponding `*_statuses` database table.

/// Status ID type matching SMALLINT in the database.
pub type StatusId = i16;

macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident = $val:literal => $label:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[repr(i16)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub enum $name {
            $( $(#[$vmeta])* $variant = $val ),+
        }

        impl $name {
            /// Return the database status ID.
            pub fn id(self) -> StatusId {
                self as StatusId
            }

            /// Look up a variant by its database ID.
            pub fn from_id(id: StatusId) -> Option<Self> {
                match id {
                    $( $val => Some($name::$variant), )+
                    _ => None,
                }
            }

            /// Lowercase name as seeded in the lookup table.
            pub fn as_str(self) -> &'static str {
                match self {
                    $( $name::$variant => $label, )+
                }
            }
        }

        impl From<$name> for StatusId {
            fn from(value: $name) -> Self {
                value as StatusId
            }
        }
    };
}

define_status_enum! {
    /// Clip lifecycle status.
    ClipStatus {
        Pending = 1 => "pending",
        Processing = 2 => "processing",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
    }
}

define_status_enum! {
    /// Queued job status.
    JobStatus {
        Pending = 1 => "pending",
        Processing = 2 => "processing",
        Completed = 3 => "completed",
        Failed = 4 => "failed",
        Cancelled = 5 => "cancelled",
    }
}

impl ClipStatus {
    /// Clips only move forward: `pending -> processing -> completed | failed`.
    ///
    /// A pending clip may also fail directly when its job fails before the
    /// clip was picked up.
    pub fn can_transition_to(self, next: ClipStatus) -> bool {
        matches!(
            (self, next),
            (ClipStatus::Pending, ClipStatus::Processing)
                | (ClipStatus::Pending, ClipStatus::Failed)
                | (ClipStatus::Processing, ClipStatus::Completed)
                | (ClipStatus::Processing, ClipStatus::Failed)
        )
    }
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_ids_match_seed_data() {
        assert_eq!(JobStatus::Pending.id(), 1);
        assert_eq!(JobStatus::Processing.id(), 2);
        assert_eq!(JobStatus::Completed.id(), 3);
        assert_eq!(JobStatus::Failed.id(), 4);
        assert_eq!(JobStatus::Cancelled.id(), 5);
    }

    #[test]
    fn clip_status_ids_match_seed_data() {
        assert_eq!(ClipStatus::Pending.id(), 1);
        assert_eq!(ClipStatus::Processing.id(), 2);
        assert_eq!(ClipStatus::Completed.id(), 3);
        assert_eq!(ClipStatus::Failed.id(), 4);
    }

    #[test]
    fn status_round_trips_through_id() {
        let id: StatusId = JobStatus::Cancelled.into();
        assert_eq!(JobStatus::from_id(id), Some(JobStatus::Cancelled));
        assert_eq!(JobStatus::from_id(9), None);
        assert_eq!(JobStatus::Cancelled.as_str(), "cancelled");
    }

    #[test]
    fn clip_status_never_moves_backward() {
        use ClipStatus::*;
        let all = [Pending, Processing, Completed, Failed];
        for from in all {
            for to in all {
                if to.id() <= from.id() {
                    assert!(!from.can_transition_to(to), "{from:?} -> {to:?}");
                }
            }
        }
        assert!(!Completed.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
    }

    #[test]
    fn terminal_job_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Processing.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
    }
}
