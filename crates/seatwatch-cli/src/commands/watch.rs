use anyhow::{bail, Result};
use seatwatch_core::{NewWatch, SeatNo, WatchStore};
use std::path::Path;

use super::{load_config, open_store};

fn preferred(seats: Vec<SeatNo>) -> Option<Vec<SeatNo>> {
    let mut ordered: Vec<SeatNo> = Vec::with_capacity(seats.len());
    for seat in seats {
        if !ordered.contains(&seat) {
            ordered.push(seat);
        }
    }
    Some(ordered).filter(|s| !s.is_empty())
}

pub fn add(
    config_path: &Path,
    user: &str,
    lesson_id: i64,
    auto_reserve: bool,
    seats: Vec<SeatNo>,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    if store.lesson(lesson_id)?.is_none() {
        bail!("No lesson with id {lesson_id}; import the schedule first");
    }

    let id = store.upsert_watch(&NewWatch {
        user_id: user.to_string(),
        lesson_id,
        auto_reserve,
        preferred_seats: preferred(seats),
    })?;
    println!(
        "Watch {id} armed ({})",
        if auto_reserve { "auto-reserve" } else { "notify only" }
    );
    Ok(())
}

pub fn remove(config_path: &Path, id: i64) -> Result<()> {
    let config = load_config(config_path)?;
    let store = open_store(&config)?;
    if store.delete_watch(id)? {
        println!("Removed watch {id}");
    } else {
        println!("No watch with id {id}");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_keeps_first_occurrence_order() {
        assert_eq!(preferred(vec![12, 3, 12, 7]), Some(vec![12, 3, 7]));
        assert_eq!(preferred(Vec::new()), None);
    }
}
