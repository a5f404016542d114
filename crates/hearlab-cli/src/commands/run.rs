//! Headless experiment runner: drives a full session from the terminal,
//! rendering resolved view contracts as text.

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::Duration;

use clap::Args;
use hearlab_core::{
    Action, Answer, Config, Event, FeedbackForm, HttpApiClient, PlayOutcome, SessionController,
    SystemTimeSource, TimeSource, ViewContract, ViewKind,
};

#[derive(Args)]
pub struct RunArgs {
    /// Block slug to play
    pub slug: String,
    /// Answer prompts automatically instead of reading stdin
    #[arg(long)]
    pub auto: bool,
    /// Give consent for this run without editing the config
    #[arg(long)]
    pub consent: bool,
}

pub fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_session(args))
}

async fn run_session(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let mut participant = config.participant.to_participant();
    participant.consent |= args.consent;

    let api = HttpApiClient::new(&config.api.base_url, config.api.timeout_secs)?;
    let clock: Arc<dyn TimeSource> = Arc::new(SystemTimeSource::new());
    let mut controller = SessionController::start(
        api,
        participant,
        &args.slug,
        clock,
        config.playback.device_capable,
    )
    .await?;

    loop {
        log_events(controller.drain_events());
        let Some(view) = controller.current_view() else {
            break;
        };
        match view.kind {
            ViewKind::Explainer | ViewKind::Info | ViewKind::Playlist | ViewKind::Loading => {
                render_text(&view);
                pause(
                    args.auto,
                    view.props.button_label.as_deref().unwrap_or("Continue"),
                );
                controller.on_next().await;
            }
            ViewKind::Score => {
                render_score(&view);
                pause(args.auto, "Next");
                controller.on_next().await;
            }
            ViewKind::Trial => run_trial(&mut controller, view, args.auto).await?,
            ViewKind::Final => {
                render_text(&view);
                if let Some(rank) = &view.props.rank {
                    println!("Rank: {rank}");
                }
                if let Some(total) = view.props.total_score {
                    println!("Total score: {total}");
                }
                break;
            }
            ViewKind::Redirect => {
                if let Some(url) = &view.props.url {
                    println!("Continue at: {url}");
                }
                break;
            }
            ViewKind::Error => {
                let message = view
                    .props
                    .error_message
                    .unwrap_or_else(|| "unknown error".into());
                return Err(message.into());
            }
        }
    }
    log_events(controller.drain_events());
    Ok(())
}

async fn run_trial(
    controller: &mut SessionController<HttpApiClient>,
    view: ViewContract,
    auto: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    render_text(&view);

    if view.props.playback.is_some() {
        let mut outcome = controller.play(0, 0.0).await;
        if matches!(outcome, Some(PlayOutcome::GestureRequired { .. })) {
            pause(auto, "Start audio");
            controller.user_gesture();
            outcome = controller.play(0, 0.0).await;
        }
        if matches!(outcome, Some(PlayOutcome::Started { .. })) {
            // The bundled backends carry no asset durations; report end of
            // output right away so the turn policy can run.
            controller.playback_output_ended(0).await;
        }
    }

    let auto_advance = matches!(
        controller.current_action(),
        Some(Action::Trial { config, .. }) if config.auto_advance
    );
    if auto_advance {
        wait_for_next_action(controller).await;
        return Ok(());
    }

    let answers = match &view.props.feedback_form {
        Some(form) => collect_answers(form, auto)?,
        None => {
            pause(
                auto,
                view.props.button_label.as_deref().unwrap_or("Continue"),
            );
            Vec::new()
        }
    };
    controller.submit_result(answers, false).await;
    Ok(())
}

/// Poll timers until the controller activates the next action.
async fn wait_for_next_action(controller: &mut SessionController<HttpApiClient>) {
    for _ in 0..6000 {
        controller.tick().await;
        let events = controller.drain_events();
        let advanced = events
            .iter()
            .any(|e| matches!(e, Event::ActionActivated { .. }));
        log_events(events);
        if advanced {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    log::warn!("Gave up waiting for the auto-advance timer");
}

fn collect_answers(
    form: &FeedbackForm,
    auto: bool,
) -> Result<Vec<Answer>, Box<dyn std::error::Error>> {
    let mut answers = Vec::new();
    for question in &form.form {
        let prompt = question.question.as_deref().unwrap_or(&question.key);
        if question.choices.is_empty() {
            println!("{prompt}");
        } else {
            println!("{prompt} {:?}", question.choices);
        }
        let value = if auto {
            question
                .value
                .clone()
                .or_else(|| question.choices.first().cloned())
        } else {
            print!("> ");
            std::io::stdout().flush()?;
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        };
        answers.push(Answer {
            key: question.key.clone(),
            value,
            is_skippable: question.is_skippable,
        });
    }
    Ok(answers)
}

fn render_text(view: &ViewContract) {
    if let Some(title) = &view.props.title {
        println!("\n== {title} ==");
    }
    if let Some(instruction) = &view.props.instruction {
        println!("{instruction}");
    }
    for (i, step) in view.props.steps.iter().enumerate() {
        println!("  {}. {step}", i + 1);
    }
    if let Some(html) = &view.props.html {
        println!("{html}");
    }
    if let Some(loading) = &view.props.loading_text {
        println!("{loading}");
    }
}

fn render_score(view: &ViewContract) {
    render_text(view);
    if let Some(score) = view.props.score {
        println!("Score: {score}");
    }
    if let Some(total) = view.props.total_score {
        println!("Total: {total}");
    }
}

fn pause(auto: bool, label: &str) {
    if auto {
        return;
    }
    println!("[{label}] (press enter)");
    let mut line = String::new();
    let _ = std::io::stdin().lock().read_line(&mut line);
}

fn log_events(events: Vec<Event>) {
    for event in events {
        if let Ok(json) = serde_json::to_string(&event) {
            log::debug!("{json}");
        }
    }
}
