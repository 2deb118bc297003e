//! Console presentation of the replicated session.
//!
//! Nothing here polls: [`install_reporters`] subscribes to the replica's
//! change callbacks and prints whenever the authority's values move.

use crate::replica::ReplicaStore;
use shared::{LockState, ObjectInfo, RoundPhase, Session};

/// Formats a countdown as `m:ss`, rounding partial seconds up.
pub fn format_time(seconds: f32) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.ceil() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

pub fn format_session(session: &Session) -> String {
    let mut line = format!(
        "{:?} | time {} | score {} | best {}",
        session.phase,
        format_time(session.time_remaining),
        session.score,
        session.best_score
    );
    if session.new_best_achieved {
        line.push_str(" | NEW BEST");
    }
    line
}

pub fn format_object(info: &ObjectInfo, lock: Option<LockState>, position: Option<[f32; 3]>) -> String {
    let lock = match lock {
        Some(LockState::Held(holder)) => format!("held by {}", holder),
        _ => "free".to_string(),
    };
    let mut line = format!(
        "#{} {} ({} pts) {}",
        info.object_id, info.category, info.value, lock
    );
    if let Some([x, y, z]) = position {
        line.push_str(&format!(" at ({:.1}, {:.1}, {:.1})", x, y, z));
    }
    line
}

/// Prints round, score and lock changes as they are replicated.
pub fn install_reporters(replica: &mut ReplicaStore) {
    replica.on_phase_change(|_, phase| match phase {
        RoundPhase::Running => println!(">> Round started"),
        RoundPhase::Ended => println!(">> Round over"),
        RoundPhase::Idle => {}
    });

    replica.on_time_change(|old, new| {
        let shown = format_time(*new);
        if format_time(*old) != shown && new.ceil() as u64 % 10 == 0 {
            println!(">> {} left", shown);
        }
    });

    replica.on_score_change(|_, score| println!(">> Score: {}", score));
    replica.on_best_score_change(|_, best| println!(">> Best score: {}", best));
    replica.on_new_best_change(|_, achieved| {
        if *achieved {
            println!(">> New best score!");
        }
    });

    replica.on_lock_change(|object_id, _, lock| match lock {
        LockState::Held(holder) => println!(">> Object {} grabbed by {}", object_id, holder),
        LockState::Free => println!(">> Object {} released", object_id),
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::Category;

    #[test]
    fn test_format_time_rounds_up() {
        assert_eq!(format_time(120.0), "2:00");
        assert_eq!(format_time(119.2), "2:00");
        assert_eq!(format_time(61.0), "1:01");
        assert_eq!(format_time(9.01), "0:10");
        assert_eq!(format_time(0.4), "0:01");
    }

    #[test]
    fn test_format_time_clamps() {
        assert_eq!(format_time(0.0), "0:00");
        assert_eq!(format_time(-3.0), "0:00");
        assert_eq!(format_time(f32::NAN), "0:00");
    }

    #[test]
    fn test_format_session() {
        let session = Session {
            phase: RoundPhase::Ended,
            time_remaining: 0.0,
            score: 5,
            best_score: 5,
            new_best_achieved: true,
        };
        assert_eq!(
            format_session(&session),
            "Ended | time 0:00 | score 5 | best 5 | NEW BEST"
        );
    }

    #[test]
    fn test_format_object() {
        let info = ObjectInfo {
            object_id: 3,
            category: Category::Organic,
            value: 2,
        };
        assert_eq!(
            format_object(&info, Some(LockState::Held(1)), Some([1.0, 2.0, 3.0])),
            "#3 organic (2 pts) held by 1 at (1.0, 2.0, 3.0)"
        );
        assert_eq!(format_object(&info, None, None), "#3 organic (2 pts) free");
    }
}
