use std::collections::HashSet;

use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, KeyboardButton, KeyboardMarkup};

use crate::engine::question::{Question, Topic};
use crate::engine::{QuestionId, TopicId};

// Main-menu button labels, matched verbatim in the message handler.
pub const START_QUIZ: &str = "Start quiz";
pub const RANDOM_QUESTION: &str = "Random question";
pub const MY_STATS: &str = "My stats";
pub const HELP: &str = "Help";

const CONFIRM_DATA: &str = "topics:confirm";
const CANCEL_DATA: &str = "topics:cancel";

/// A decoded inline-button tap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackIntent {
    ToggleTopic(TopicId),
    ConfirmTopics,
    CancelTopics,
    Answer {
        question_id: QuestionId,
        option: usize,
    },
}

pub fn main_menu() -> KeyboardMarkup {
    KeyboardMarkup::new(vec![
        vec![
            KeyboardButton::new(START_QUIZ),
            KeyboardButton::new(RANDOM_QUESTION),
        ],
        vec![KeyboardButton::new(MY_STATS), KeyboardButton::new(HELP)],
    ])
}

/// One row per topic with a check-mark on the selected ones, plus a
/// Confirm/Cancel row at the bottom.
pub fn topic_multi_select(topics: &[Topic], selected: &HashSet<TopicId>) -> InlineKeyboardMarkup {
    let mut rows: Vec<Vec<InlineKeyboardButton>> = topics
        .iter()
        .map(|topic| {
            let label = if selected.contains(&topic.id) {
                format!("✅ {}", topic.name)
            } else {
                topic.name.clone()
            };
            vec![InlineKeyboardButton::callback(
                label,
                format!("topic:{}", topic.id),
            )]
        })
        .collect();
    rows.push(vec![
        InlineKeyboardButton::callback("Confirm", CONFIRM_DATA),
        InlineKeyboardButton::callback("Cancel", CANCEL_DATA),
    ]);
    InlineKeyboardMarkup::new(rows)
}

/// One button per answer option. The callback data carries the question id
/// so the engine can drop taps on questions that are no longer current.
pub fn answer_options(question: &Question) -> InlineKeyboardMarkup {
    let rows: Vec<Vec<InlineKeyboardButton>> = question
        .options
        .iter()
        .enumerate()
        .map(|(idx, option)| {
            vec![InlineKeyboardButton::callback(
                option.clone(),
                format!("ans:{}:{}", question.id, idx),
            )]
        })
        .collect();
    InlineKeyboardMarkup::new(rows)
}

pub fn parse_callback(data: &str) -> Option<CallbackIntent> {
    match data {
        CONFIRM_DATA => return Some(CallbackIntent::ConfirmTopics),
        CANCEL_DATA => return Some(CallbackIntent::CancelTopics),
        _ => {}
    }
    if let Some(rest) = data.strip_prefix("ans:") {
        let (question_id, option) = rest.split_once(':')?;
        return Some(CallbackIntent::Answer {
            question_id: question_id.parse().ok()?,
            option: option.parse().ok()?,
        });
    }
    if let Some(rest) = data.strip_prefix("topic:") {
        return rest.parse().ok().map(CallbackIntent::ToggleTopic);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_topic_and_answer_data() {
        assert_eq!(parse_callback("topic:7"), Some(CallbackIntent::ToggleTopic(7)));
        assert_eq!(parse_callback("topics:confirm"), Some(CallbackIntent::ConfirmTopics));
        assert_eq!(parse_callback("topics:cancel"), Some(CallbackIntent::CancelTopics));
        assert_eq!(
            parse_callback("ans:42:1"),
            Some(CallbackIntent::Answer {
                question_id: 42,
                option: 1
            })
        );
    }

    #[test]
    fn rejects_malformed_data() {
        assert_eq!(parse_callback(""), None);
        assert_eq!(parse_callback("topic:xyz"), None);
        assert_eq!(parse_callback("ans:42"), None);
        assert_eq!(parse_callback("ans:42:"), None);
        assert_eq!(parse_callback("something else"), None);
    }

    #[test]
    fn selected_topics_get_a_check_mark() {
        let topics = vec![
            Topic {
                id: 1,
                name: "Math".to_string(),
            },
            Topic {
                id: 2,
                name: "History".to_string(),
            },
        ];
        let keyboard = topic_multi_select(&topics, &HashSet::from([2]));

        // One row per topic plus the confirm/cancel row.
        assert_eq!(keyboard.inline_keyboard.len(), 3);
        assert_eq!(keyboard.inline_keyboard[0][0].text, "Math");
        assert_eq!(keyboard.inline_keyboard[1][0].text, "✅ History");
        assert_eq!(keyboard.inline_keyboard[2].len(), 2);
    }
}
