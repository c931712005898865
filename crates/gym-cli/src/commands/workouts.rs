//! Exercise catalogue and history commands.

use super::{require_session, Client};
use crate::output::{self, OutputFormat};
use anyhow::Result;

/// List muscle groups.
pub async fn groups(client: &Client, format: &OutputFormat) -> Result<()> {
    require_session(client)?;
    let groups = client.api.groups().await?;

    output::print_with(&groups, format, |groups| {
        if groups.is_empty() {
            println!("No groups found.");
            return;
        }
        output::print_heading("Groups");
        for group in groups {
            println!("  {}", group);
        }
    });
    Ok(())
}

/// List the exercises of one group.
pub async fn exercises(client: &Client, group: &str, format: &OutputFormat) -> Result<()> {
    require_session(client)?;
    let exercises = client.api.exercises_by_group(group).await?;

    output::print_with(&exercises, format, |exercises| {
        if exercises.is_empty() {
            println!("No exercises found for {}.", group);
            return;
        }
        output::print_heading(&format!("Exercises: {}", group));
        for exercise in exercises {
            println!(
                "  {:<6} {:<32} {} x {}",
                exercise.id, exercise.name, exercise.series, exercise.repetitions
            );
        }
    });
    Ok(())
}

/// Show one exercise.
pub async fn exercise(client: &Client, exercise_id: &str, format: &OutputFormat) -> Result<()> {
    require_session(client)?;
    let exercise = client.api.exercise(exercise_id).await?;

    output::print_with(&exercise, format, |exercise| {
        output::print_heading(&exercise.name);
        output::print_row("ID", &exercise.id);
        output::print_row("Group", &exercise.group);
        output::print_row("Series", &exercise.series.to_string());
        output::print_row("Repetitions", &exercise.repetitions.to_string());
        if !exercise.demo.is_empty() {
            output::print_row("Demo", &client.api.exercise_demo_url(exercise));
        }
        if !exercise.thumb.is_empty() {
            output::print_row("Thumbnail", &client.api.exercise_thumb_url(exercise));
        }
    });
    Ok(())
}

/// Show completed exercises grouped by day.
pub async fn history(client: &Client, format: &OutputFormat) -> Result<()> {
    require_session(client)?;
    let days = client.api.history().await?;

    output::print_with(&days, format, |days| {
        if days.is_empty() {
            println!("No exercises done yet.");
            return;
        }
        for day in days {
            output::print_heading(&day.title);
            for entry in &day.data {
                println!("  {:<6} {:<32} {:<12} {}", entry.hour, entry.name, entry.group, entry.id);
            }
        }
    });
    Ok(())
}

/// Mark an exercise as done.
pub async fn mark_done(client: &Client, exercise_id: &str, format: &OutputFormat) -> Result<()> {
    require_session(client)?;
    client.api.register_history(exercise_id).await?;
    output::print_success(&format!("Exercise {} registered in history", exercise_id), format);
    Ok(())
}
