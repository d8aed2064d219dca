mod engine;
mod keyboard;

use std::sync::Arc;

use dotenv::dotenv;
use teloxide::{prelude::*, types::PollType, utils::command::BotCommands};

use engine::error::EngineError;
use engine::ledger::InMemoryAnswerLedger;
use engine::question::{InMemoryQuestionSource, Question, QuestionSource};
use engine::session::InMemorySessionStore;
use engine::{AnswerOutcome, EngineConfig, QuizEngine, RejectReason, StartOutcome, UserId};
use keyboard::CallbackIntent;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "show the main menu.")]
    Start,
    #[command(description = "show this help.")]
    Help,
    #[command(description = "send one random question as a quiz poll.")]
    Question,
    #[command(description = "show your answer statistics.")]
    Stats,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    log::info!("Starting quiz bot...");

    let bot = Bot::from_env();

    let catalog_path =
        std::env::var("QUESTIONS_FILE").unwrap_or_else(|_| "questions.json".to_string());
    let empty_selection_fallback = std::env::var("EMPTY_SELECTION_FALLBACK")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    println!("Loading the question catalog from {}", catalog_path);
    let source = InMemoryQuestionSource::from_file(&catalog_path, empty_selection_fallback)
        .expect("Failed to load the question catalog");
    log::info!(
        "Loaded {} questions across {} topics",
        source.question_count(),
        source.topics().len()
    );

    let engine = Arc::new(QuizEngine::new(
        Arc::new(InMemorySessionStore::new()),
        Arc::new(InMemoryAnswerLedger::new()),
        Arc::new(source),
        EngineConfig::from_env(),
    ));

    Dispatcher::builder(
        bot,
        dptree::entry()
            .branch(
                Update::filter_message()
                    .filter_command::<Command>()
                    .endpoint(handle_command),
            )
            .branch(Update::filter_message().endpoint(handle_message))
            .branch(Update::filter_callback_query().endpoint(handle_callback)),
    )
    .dependencies(dptree::deps![engine])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const GREETING_TEXT: &str =
    "Hi! I run short quizzes on the topics you pick. Use the menu below to get going.";

async fn handle_command(
    bot: Bot,
    engine: Arc<QuizEngine>,
    msg: Message,
    cmd: Command,
) -> HandlerResult {
    let Some(user) = msg.from().map(|u| u.id.0) else {
        return Ok(());
    };
    let chat = msg.chat.id;

    match cmd {
        Command::Start => {
            bot.send_message(chat, GREETING_TEXT)
                .reply_markup(keyboard::main_menu())
                .await?;
        }
        Command::Help => send_help(&bot, chat).await?,
        Command::Question => send_random_question(&bot, &engine, chat).await?,
        Command::Stats => send_stats(&bot, &engine, user, chat).await?,
    }
    Ok(())
}

async fn handle_message(bot: Bot, engine: Arc<QuizEngine>, msg: Message) -> HandlerResult {
    let Some(user) = msg.from().map(|u| u.id.0) else {
        return Ok(());
    };
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let chat = msg.chat.id;
    log::debug!("message from user {}: {}", user, text);

    match text {
        keyboard::START_QUIZ => start_quiz(&bot, &engine, user, chat).await,
        keyboard::RANDOM_QUESTION => send_random_question(&bot, &engine, chat).await,
        keyboard::MY_STATS => send_stats(&bot, &engine, user, chat).await,
        keyboard::HELP => send_help(&bot, chat).await,
        other => handle_free_text(&bot, &engine, user, chat, other).await,
    }
}

async fn handle_callback(bot: Bot, engine: Arc<QuizEngine>, q: CallbackQuery) -> HandlerResult {
    let CallbackQuery {
        id,
        from,
        message,
        data,
        ..
    } = q;
    let user = from.id.0;

    let Some(intent) = data.as_deref().and_then(keyboard::parse_callback) else {
        log::warn!("unparseable callback data from user {}: {:?}", user, data);
        bot.answer_callback_query(id).await?;
        return Ok(());
    };
    let Some(message) = message else {
        bot.answer_callback_query(id).await?;
        return Ok(());
    };
    let chat = message.chat.id;

    match intent {
        CallbackIntent::ToggleTopic(topic) => match engine.toggle_topic(user, topic) {
            Ok(view) => {
                bot.answer_callback_query(id).await?;
                bot.edit_message_reply_markup(chat, message.id)
                    .reply_markup(keyboard::topic_multi_select(&view.topics, &view.selected))
                    .await?;
            }
            Err(err) => {
                bot.answer_callback_query(id).await?;
                report_engine_error(&bot, chat, err).await?;
            }
        },
        CallbackIntent::ConfirmTopics => match engine.confirm_topics(user) {
            Ok(first) => {
                bot.answer_callback_query(id).await?;
                // Take the selection keyboard away so late taps stay rare.
                let _ = bot.edit_message_reply_markup(chat, message.id).await;
                send_question(&bot, chat, &first).await?;
            }
            Err(EngineError::Validation(_)) => {
                bot.answer_callback_query(id)
                    .text("Pick at least one topic first.")
                    .await?;
            }
            Err(err) => {
                bot.answer_callback_query(id).await?;
                report_engine_error(&bot, chat, err).await?;
            }
        },
        CallbackIntent::CancelTopics => match engine.cancel_topics(user) {
            Ok(()) => {
                bot.answer_callback_query(id).await?;
                let _ = bot.edit_message_reply_markup(chat, message.id).await;
                bot.send_message(chat, "Cancelled.")
                    .reply_markup(keyboard::main_menu())
                    .await?;
            }
            Err(err) => {
                bot.answer_callback_query(id).await?;
                report_engine_error(&bot, chat, err).await?;
            }
        },
        CallbackIntent::Answer {
            question_id,
            option,
        } => match engine.submit_answer(user, question_id, option) {
            Ok(AnswerOutcome::Rejected(RejectReason::InvalidOption)) => {
                bot.answer_callback_query(id)
                    .text("That option does not exist.")
                    .await?;
            }
            Ok(AnswerOutcome::Rejected(reason)) => {
                // Duplicate or late tap; acknowledge and move on.
                log::debug!("dropping answer tap from user {}: {:?}", user, reason);
                bot.answer_callback_query(id).await?;
            }
            Ok(outcome) => {
                bot.answer_callback_query(id).await?;
                let _ = bot.edit_message_reply_markup(chat, message.id).await;
                send_answer_outcome(&bot, chat, outcome).await?;
            }
            Err(err) => {
                bot.answer_callback_query(id).await?;
                report_engine_error(&bot, chat, err).await?;
            }
        },
    }
    Ok(())
}

async fn start_quiz(bot: &Bot, engine: &QuizEngine, user: UserId, chat: ChatId) -> HandlerResult {
    match engine.start_quiz(user) {
        Ok(StartOutcome::PresentTopics { topics, selected }) => {
            bot.send_message(chat, "Pick one or more topics, then press Confirm.")
                .reply_markup(keyboard::topic_multi_select(&topics, &selected))
                .await?;
        }
        Ok(StartOutcome::FirstQuestion(question)) => {
            send_question(bot, chat, &question).await?;
        }
        Err(err) => report_engine_error(bot, chat, err).await?,
    }
    Ok(())
}

/// Free text is only meaningful while a question is open: a bare number is
/// taken as the option index. Everything else gets a nudge to the menu.
async fn handle_free_text(
    bot: &Bot,
    engine: &QuizEngine,
    user: UserId,
    chat: ChatId,
    text: &str,
) -> HandlerResult {
    let Some(current) = engine.current_question(user)? else {
        bot.send_message(chat, "Use the menu to start a quiz.")
            .reply_markup(keyboard::main_menu())
            .await?;
        return Ok(());
    };

    match text.trim().parse::<usize>() {
        Ok(option) => match engine.submit_answer(user, current.id, option)? {
            AnswerOutcome::Rejected(RejectReason::InvalidOption) => {
                bot.send_message(chat, "That option does not exist, pick one of the buttons.")
                    .await?;
            }
            AnswerOutcome::Rejected(reason) => {
                log::debug!("dropping text answer from user {}: {:?}", user, reason);
            }
            outcome => send_answer_outcome(bot, chat, outcome).await?,
        },
        Err(_) => {
            bot.send_message(chat, "Send the option number or use the buttons.")
                .await?;
        }
    }
    Ok(())
}

async fn send_answer_outcome(bot: &Bot, chat: ChatId, outcome: AnswerOutcome) -> HandlerResult {
    match outcome {
        AnswerOutcome::NextQuestion { question, correct } => {
            let feedback = if correct { "Correct!" } else { "Not quite." };
            bot.send_message(chat, feedback).await?;
            send_question(bot, chat, &question).await?;
        }
        AnswerOutcome::Finished { stats, correct } => {
            let feedback = if correct { "Correct!" } else { "Not quite." };
            bot.send_message(chat, feedback).await?;

            let mut summary = format!(
                "Quiz finished! You got {} of {} right.",
                stats.correct, stats.total
            );
            if !stats.wrong_questions.is_empty() {
                summary.push_str("\n\nWorth another look:");
                for question in &stats.wrong_questions {
                    summary.push_str("\n• ");
                    summary.push_str(&question.text);
                }
            }
            bot.send_message(chat, summary)
                .reply_markup(keyboard::main_menu())
                .await?;
        }
        AnswerOutcome::Rejected(reason) => {
            log::debug!("rejected answer reached the renderer: {:?}", reason);
        }
    }
    Ok(())
}

async fn send_question(bot: &Bot, chat: ChatId, question: &Question) -> HandlerResult {
    bot.send_message(chat, question.text.clone())
        .reply_markup(keyboard::answer_options(question))
        .await?;
    Ok(())
}

async fn send_random_question(bot: &Bot, engine: &QuizEngine, chat: ChatId) -> HandlerResult {
    let Some(question) = engine.random_question() else {
        bot.send_message(chat, "No questions available yet.").await?;
        return Ok(());
    };

    bot.send_poll(chat, question.text, question.options)
        .type_(PollType::Quiz)
        .correct_option_id(question.correct_option as u8)
        .is_anonymous(false)
        .await?;
    Ok(())
}

async fn send_stats(bot: &Bot, engine: &QuizEngine, user: UserId, chat: ChatId) -> HandlerResult {
    let stats = engine.stats(user)?;
    let text = if stats.total == 0 {
        "You have not answered any questions yet.".to_string()
    } else {
        format!(
            "Answered: {}\nCorrect: {}\nWrong: {}",
            stats.total,
            stats.correct,
            stats.total - stats.correct
        )
    };
    bot.send_message(chat, text).await?;
    Ok(())
}

async fn send_help(bot: &Bot, chat: ChatId) -> HandlerResult {
    let text = format!(
        "{}\n\nOr use the menu buttons: start a quiz, get a random question, or check your stats.",
        Command::descriptions()
    );
    bot.send_message(chat, text)
        .reply_markup(keyboard::main_menu())
        .await?;
    Ok(())
}

/// Maps engine errors to dispatcher reactions: validation and not-found are
/// shown to the user, stale events are logged and dropped, storage failures
/// abort the current event.
async fn report_engine_error(bot: &Bot, chat: ChatId, err: EngineError) -> HandlerResult {
    match err {
        EngineError::Validation(msg) | EngineError::NotFound(msg) => {
            bot.send_message(chat, msg).await?;
        }
        EngineError::Stale(reason) => {
            log::debug!("dropping stale event: {}", reason);
        }
        EngineError::Storage(err) => {
            log::error!("storage failure while handling an update: {}", err);
            return Err(err.into());
        }
    }
    Ok(())
}
