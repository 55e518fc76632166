mod form;
mod terminal;

use std::fs::File;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tracing::info;

use schizoid::controls::CountdownTimer;
use schizoid::dialog::{Field, FieldKind, Form, Questionnaire, ScalarKind};
use schizoid::input::KeyChoice;
use schizoid::paths::AppPaths;
use schizoid::path;
use schizoid::task::{LikertOptions, TextOptions};
use schizoid::{Task, TaskConfig};

use terminal::Terminal;

const TRIALS: usize = 3;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let paths = AppPaths::new()?;
    let log = File::create(paths.log_file())?;
    tracing_subscriber::fmt()
        .with_writer(Mutex::new(log))
        .with_ansi(false)
        .init();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = match config_path {
        Some(p) => TaskConfig::load(&p)?,
        None if paths.config_file().exists() => TaskConfig::load(&paths.config_file())?,
        None => TaskConfig::default(),
    };
    if config.debug_log_dir.is_none() {
        config.debug_log_dir = Some(paths.debug_log_dir());
    }

    let term = Terminal::open(Duration::from_millis(16))?;
    let mut task = Task::new(config, term)?;

    let subject = task.get_subject_id("schizoid demo")?;
    info!("Subject {}", subject);
    run_demo(&mut task)?;

    let out = paths.record_file(&subject);
    task.done(&out)?;
    println!("Record written to {}", out.display());
    Ok(())
}

fn run_demo(task: &mut Task<Terminal>) -> schizoid::Result<()> {
    task.start_clock();
    task.instructions(
        "intro",
        "Welcome. Use the mouse to press buttons and the keyboard to answer prompts. Escape quits.",
    )?;

    let yes_no = KeyChoice::map([("y", 1), ("n", 0)]);
    for trial in 0..TRIALS {
        let mut t = task.prefix(path!["trials", trial]);

        let cross = t.fixation_cross();
        t.wait_screen(Duration::from_millis(500), &[cross])?;

        let prompt = t.text(0.0, 0.3, "Did you see a cross? (y/n)");
        t.keypress_screen("saw_cross", &yes_no, &[prompt])?;

        let question = t.text(0.0, 0.4, "Which side felt faster?");
        let mut buttons = [
            t.button(-0.4, -0.3, "Left").with_trigger(10 + trial as u16),
            t.button(0.4, -0.3, "Right").with_trigger(20 + trial as u16),
        ];
        t.button_screen("side", &[question], &mut buttons)?;
    }

    let header = task.text_with(0.0, 0.95, "Ratings", TextOptions::top());
    {
        let mut shown = task.showing(&[header.clone()]);
        shown.discrete_rating_screen("mood", "How alert do you feel right now?", LikertOptions::default())?;

        let anchors = || ("not at all".to_string(), "extremely".to_string());
        let mut scales = [
            shown.rating_scale((0.0, 0.3), 1, 5, anchors(), 1.5),
            shown.rating_scale((0.0, -0.4), 1, 5, anchors(), 1.5),
        ];
        let labels = [
            shown.text(0.0, 0.5, "How interesting was the task?"),
            shown.text(0.0, -0.2, "How tiring was the task?"),
        ];
        shown.scale_screen("task_ratings", &labels, &mut scales)?;

        let mut quiet = shown.hiding(&[header])?;
        let levels = ["never", "sometimes", "often", "always"].map(String::from).to_vec();
        let questionnaire = Questionnaire::numbered(
            levels,
            [
                "I found it hard to concentrate.",
                "My mind wandered.",
                "I felt rushed.",
                "I guessed on some trials.",
            ],
        );
        quiet.questionnaire_screen("focus", "Rate how often each statement applied.", &questionnaire)?;
    }

    task.nonneg_int_entry_screen("age", "How old are you?")?;
    task.text_entry_screen("comments", "Any comments about the session?", true)?;

    let setup = Form::new("Follow-up")
        .text("Optional details")
        .field(Field::new("Hours slept:", FieldKind::Scalar(ScalarKind::Float)))
        .field(Field::new("Coffee today:", FieldKind::Scalar(ScalarKind::Bool)))
        .field(Field::new("Preferred sessions (days):", FieldKind::List(ScalarKind::Integer)).initial("[1, 3]"));
    let values = task.form_screen(&setup)?;
    for (key, value) in ["hours_slept", "coffee", "preferred_days"].into_iter().zip(values) {
        task.save(path!["follow_up", key], value)?;
    }

    let timer = CountdownTimer::new(Duration::from_secs(3));
    let wait = task.text(0.0, 0.0, "Saving, please wait...");
    task.wait_screen_till(&timer, &[wait])?;

    let thanks = task.text(0.0, 0.2, "Thank you. The session is complete.");
    task.okay_screen("outro", &[thanks])
}
