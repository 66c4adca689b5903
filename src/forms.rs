//! Application forms (staff applications, event sign-ups…) answered through
//! Discord modals. Forms longer than one modal are split into pages.

use crate::api::{assigned_key, KeyKind, Resource};
use crate::components::ComponentAction;
use crate::lazy::{LazyChannel, LazyUser};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serenity::all::{
    CreateActionRow, CreateEmbed, CreateEmbedFooter, CreateInputText, CreateModal, GuildId,
    InputTextStyle, UserId,
};
use std::collections::{BTreeMap, HashMap};
use std::ops::Range;
use std::sync::Mutex;
use thiserror::Error;

pub const MAX_QUESTIONS: usize = 25;
pub const QUESTIONS_PER_PAGE: usize = 5;
const MAX_LABEL: usize = 45;
const MAX_MODAL_TITLE: usize = 45;
const MAX_ANSWER: u16 = 4000;
const MAX_FORM_NAME: usize = 100;
const EMBED_FIELD_LIMIT: usize = 1024;

#[derive(Debug, Error, PartialEq)]
pub enum FormError {
    #[error("No form with id {0}.")]
    NotFound(u64),
    #[error("Form names must be 1 to 100 characters.")]
    InvalidName,
    #[error("A form named '{0}' already exists.")]
    DuplicateName(String),
    #[error("Question labels must be 1 to 45 characters.")]
    InvalidLabel,
    #[error("Answer length limits must satisfy min <= max <= 4000 (got {min}..{max}).")]
    InvalidLength { min: u16, max: u16 },
    #[error("A form can have at most 25 questions.")]
    TooManyQuestions,
    #[error("There is no question #{0}.")]
    QuestionNotFound(usize),
    #[error("This form has no questions yet.")]
    NoQuestions,
    #[error("This form is not accepting responses.")]
    Closed,
    #[error("Set a response channel before opening the form.")]
    NoResponseChannel,
    #[error("'{0}' needs an answer.")]
    MissingAnswer(String),
    #[error("'{label}' needs at least {min} characters.")]
    AnswerTooShort { label: String, min: u16 },
    #[error("'{label}' allows at most {max} characters.")]
    AnswerTooLong { label: String, max: u16 },
    #[error("Page {0} does not exist.")]
    PageOutOfRange(usize),
    #[error("Your application session expired. Please start again.")]
    SessionExpired,
    #[error("Your response couldn't be sent right now. Your earlier pages are kept; press Try again to resend the last page.")]
    NotSent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, poise::ChoiceParameter)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStyle {
    #[name = "Short answer"]
    Short,
    #[name = "Paragraph"]
    Paragraph,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormQuestion {
    pub label: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    pub style: QuestionStyle,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub min_length: Option<u16>,
    #[serde(default)]
    pub max_length: Option<u16>,
}

fn default_required() -> bool {
    true
}

impl FormQuestion {
    pub fn new(
        label: &str,
        style: QuestionStyle,
        required: bool,
        min_length: Option<u16>,
        max_length: Option<u16>,
        placeholder: Option<String>,
    ) -> Result<Self, FormError> {
        let question = Self {
            label: label.trim().to_string(),
            placeholder: placeholder.filter(|p| !p.trim().is_empty()),
            style,
            required,
            min_length,
            max_length,
        };
        question.validate()?;
        Ok(question)
    }

    pub fn validate(&self) -> Result<(), FormError> {
        let chars = self.label.chars().count();
        if chars == 0 || chars > MAX_LABEL {
            return Err(FormError::InvalidLabel);
        }
        let (min, max) = self.bounds();
        if min > max || max > MAX_ANSWER {
            return Err(FormError::InvalidLength { min, max });
        }
        Ok(())
    }

    fn bounds(&self) -> (u16, u16) {
        (self.min_length.unwrap_or(0), self.max_length.unwrap_or(MAX_ANSWER))
    }

    fn check_answer(&self, answer: &str) -> Result<(), FormError> {
        let answer = answer.trim();
        if answer.is_empty() {
            return if self.required {
                Err(FormError::MissingAnswer(self.label.clone()))
            } else {
                Ok(())
            };
        }
        let (min, max) = self.bounds();
        let len = answer.chars().count();
        if len < min as usize {
            return Err(FormError::AnswerTooShort {
                label: self.label.clone(),
                min,
            });
        }
        if len > max as usize {
            return Err(FormError::AnswerTooLong {
                label: self.label.clone(),
                max,
            });
        }
        Ok(())
    }

    fn input(&self, index: usize) -> CreateInputText {
        let style = match self.style {
            QuestionStyle::Short => InputTextStyle::Short,
            QuestionStyle::Paragraph => InputTextStyle::Paragraph,
        };
        let (min, max) = self.bounds();
        let mut input = CreateInputText::new(style, &self.label, input_id(index))
            .required(self.required)
            .max_length(max);
        if min > 0 {
            input = input.min_length(min);
        }
        if let Some(placeholder) = &self.placeholder {
            input = input.placeholder(placeholder);
        }
        input
    }
}

/// Custom id of the modal input for question `index` (zero-based, across all pages).
pub fn input_id(index: usize) -> String {
    format!("q{index}")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Form {
    #[serde(default)]
    pub id: u64,
    pub guild_id: GuildId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub response_channel: Option<LazyChannel>,
    #[serde(default)]
    pub questions: Vec<FormQuestion>,
    #[serde(default)]
    pub open: bool,
}

impl Form {
    pub fn new(guild_id: GuildId, name: &str, description: Option<String>) -> Self {
        Self {
            id: 0,
            guild_id,
            name: name.trim().to_string(),
            description,
            response_channel: None,
            questions: Vec::new(),
            open: false,
        }
    }

    pub fn add_question(&mut self, question: FormQuestion) -> Result<usize, FormError> {
        if self.questions.len() >= MAX_QUESTIONS {
            return Err(FormError::TooManyQuestions);
        }
        question.validate()?;
        self.questions.push(question);
        Ok(self.questions.len())
    }

    /// `number` is one-based, as shown to users.
    pub fn remove_question(&mut self, number: usize) -> Result<FormQuestion, FormError> {
        if number == 0 || number > self.questions.len() {
            return Err(FormError::QuestionNotFound(number));
        }
        let removed = self.questions.remove(number - 1);
        if self.questions.is_empty() {
            self.open = false;
        }
        Ok(removed)
    }

    pub fn set_open(&mut self, open: bool) -> Result<(), FormError> {
        if open {
            if self.questions.is_empty() {
                return Err(FormError::NoQuestions);
            }
            if self.response_channel.is_none() {
                return Err(FormError::NoResponseChannel);
            }
        }
        self.open = open;
        Ok(())
    }

    pub fn page_count(&self) -> usize {
        self.questions.len().div_ceil(QUESTIONS_PER_PAGE)
    }

    /// Question index ranges, one per modal page.
    pub fn pages(&self) -> Vec<Range<usize>> {
        (0..self.page_count())
            .map(|page| {
                let start = page * QUESTIONS_PER_PAGE;
                start..(start + QUESTIONS_PER_PAGE).min(self.questions.len())
            })
            .collect()
    }

    fn page(&self, page: usize) -> Result<Range<usize>, FormError> {
        self.pages()
            .into_iter()
            .nth(page)
            .ok_or(FormError::PageOutOfRange(page))
    }

    pub fn modal(&self, page: usize) -> Result<CreateModal, FormError> {
        let range = self.page(page)?;
        let mut title = if self.page_count() > 1 {
            format!("{} ({}/{})", self.name, page + 1, self.page_count())
        } else {
            self.name.clone()
        };
        if title.chars().count() > MAX_MODAL_TITLE {
            title = title.chars().take(MAX_MODAL_TITLE - 1).collect();
            title.push('…');
        }
        let rows = range
            .map(|i| CreateActionRow::InputText(self.questions[i].input(i)))
            .collect();
        let custom_id = ComponentAction::SubmitForm {
            form: self.id,
            page,
        };
        Ok(CreateModal::new(custom_id.to_string(), title).components(rows))
    }

    /// `answers` holds one entry per question on the page, in order.
    pub fn validate_answers(&self, page: usize, answers: &[String]) -> Result<(), FormError> {
        let range = self.page(page)?;
        for (offset, index) in range.enumerate() {
            let answer = answers.get(offset).map(String::as_str).unwrap_or("");
            self.questions[index].check_answer(answer)?;
        }
        Ok(())
    }

    pub fn responses_path(&self) -> String {
        format!("{}/responses", self.item_path_unchecked())
    }

    fn item_path_unchecked(&self) -> String {
        format!("guilds/{}/{}/{}", self.guild_id, Self::COLLECTION, self.id)
    }
}

impl Resource for Form {
    const COLLECTION: &'static str = "forms";
    const KEY_KIND: KeyKind = KeyKind::Assigned;

    fn guild_id(&self) -> GuildId {
        self.guild_id
    }

    fn key(&self) -> Option<String> {
        assigned_key(self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormAnswer {
    pub question: String,
    pub answer: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormResponse {
    #[serde(default)]
    pub id: u64,
    pub guild_id: GuildId,
    pub form_id: u64,
    pub user: LazyUser,
    pub answers: Vec<FormAnswer>,
    pub submitted_at: DateTime<Utc>,
}

impl FormResponse {
    pub fn new(form: &Form, user_id: UserId, answers: Vec<String>, now: DateTime<Utc>) -> Self {
        let answers = form
            .questions
            .iter()
            .zip(answers.into_iter().chain(std::iter::repeat(String::new())))
            .map(|(q, a)| FormAnswer {
                question: q.label.clone(),
                answer: a.trim().to_string(),
            })
            .collect();
        Self {
            id: 0,
            guild_id: form.guild_id,
            form_id: form.id,
            user: LazyUser(user_id),
            answers,
            submitted_at: now,
        }
    }

    pub fn to_embed(&self, form_name: &str, color: u32) -> CreateEmbed {
        let mut embed = CreateEmbed::new()
            .title(format!("📝 {}", form_name))
            .description(format!("Submitted by {}", self.user.mention()))
            .color(color)
            .timestamp(self.submitted_at);
        for answer in &self.answers {
            let mut value = if answer.answer.is_empty() {
                "*No answer*".to_string()
            } else {
                answer.answer.clone()
            };
            if value.chars().count() > EMBED_FIELD_LIMIT {
                value = value.chars().take(EMBED_FIELD_LIMIT - 1).collect();
                value.push('…');
            }
            embed = embed.field(&answer.question, value, false);
        }
        if self.id != 0 {
            embed = embed.footer(CreateEmbedFooter::new(format!("Response #{}", self.id)));
        }
        embed
    }
}

#[derive(Debug, Clone, Default)]
pub struct FormManager {
    forms: BTreeMap<u64, Form>,
}

impl FormManager {
    pub fn new(forms: Vec<Form>) -> Self {
        Self {
            forms: forms.into_iter().map(|f| (f.id, f)).collect(),
        }
    }

    pub fn validate_new(&self, name: &str) -> Result<(), FormError> {
        let name = name.trim();
        if name.is_empty() || name.chars().count() > MAX_FORM_NAME {
            return Err(FormError::InvalidName);
        }
        if self.by_name(name).is_some() {
            return Err(FormError::DuplicateName(name.to_string()));
        }
        Ok(())
    }

    pub fn insert(&mut self, form: Form) {
        self.forms.insert(form.id, form);
    }

    pub fn get(&self, id: u64) -> Result<&Form, FormError> {
        self.forms.get(&id).ok_or(FormError::NotFound(id))
    }

    pub fn get_mut(&mut self, id: u64) -> Result<&mut Form, FormError> {
        self.forms.get_mut(&id).ok_or(FormError::NotFound(id))
    }

    pub fn by_name(&self, name: &str) -> Option<&Form> {
        let name = name.trim();
        self.forms.values().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn remove(&mut self, id: u64) -> Option<Form> {
        self.forms.remove(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Form> {
        self.forms.values()
    }
}

struct FormSession {
    answers: Vec<String>,
    next_page: usize,
    updated_at: DateTime<Utc>,
}

/// Answers collected so far from users part-way through a multi-page form.
#[derive(Default)]
pub struct FormSessions {
    sessions: Mutex<HashMap<(UserId, u64), FormSession>>,
}

impl FormSessions {
    pub const TTL_MINUTES: i64 = 30;

    pub fn new() -> Self {
        Self::default()
    }

    /// Stores one page of answers. Returns every answer once the last page is in.
    pub fn record_page(
        &self,
        user_id: UserId,
        form_id: u64,
        page: usize,
        answers: Vec<String>,
        page_count: usize,
        now: DateTime<Utc>,
    ) -> Result<Option<Vec<String>>, FormError> {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let key = (user_id, form_id);
        let ttl = Duration::minutes(Self::TTL_MINUTES);

        if page == 0 {
            sessions.insert(
                key,
                FormSession {
                    answers: Vec::new(),
                    next_page: 0,
                    updated_at: now,
                },
            );
        }
        let current = sessions
            .get(&key)
            .is_some_and(|s| s.next_page == page && now - s.updated_at <= ttl);
        if !current {
            sessions.remove(&key);
            return Err(FormError::SessionExpired);
        }
        let Some(session) = sessions.get_mut(&key) else {
            return Err(FormError::SessionExpired);
        };
        session.answers.extend(answers);
        session.next_page += 1;
        session.updated_at = now;

        if session.next_page < page_count {
            return Ok(None);
        }
        Ok(sessions.remove(&key).map(|s| s.answers))
    }

    /// Reopens a session at `page` with the answers from the pages before it,
    /// so a response that failed to send only needs its last page again.
    pub fn reopen(
        &self,
        user_id: UserId,
        form_id: u64,
        page: usize,
        answers: Vec<String>,
        now: DateTime<Utc>,
    ) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.insert(
            (user_id, form_id),
            FormSession {
                answers,
                next_page: page,
                updated_at: now,
            },
        );
    }

    pub fn clear(&self, user_id: UserId, form_id: u64) {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        sessions.remove(&(user_id, form_id));
    }

    /// Drops sessions idle for longer than the TTL.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        let ttl = Duration::minutes(Self::TTL_MINUTES);
        sessions.retain(|_, s| now - s.updated_at <= ttl);
        before - sessions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn short(label: &str) -> FormQuestion {
        FormQuestion::new(label, QuestionStyle::Short, true, None, Some(100), None).unwrap()
    }

    fn form_with(questions: usize) -> Form {
        let mut form = Form::new(GuildId::new(1), "Staff application", None);
        form.id = 3;
        for i in 0..questions {
            form.add_question(short(&format!("Question {}", i + 1))).unwrap();
        }
        form
    }

    #[test]
    fn question_validation() {
        assert_eq!(
            FormQuestion::new("", QuestionStyle::Short, true, None, None, None),
            Err(FormError::InvalidLabel)
        );
        assert_eq!(
            FormQuestion::new(&"x".repeat(46), QuestionStyle::Short, true, None, None, None),
            Err(FormError::InvalidLabel)
        );
        assert_eq!(
            FormQuestion::new("Age", QuestionStyle::Short, true, Some(10), Some(5), None),
            Err(FormError::InvalidLength { min: 10, max: 5 })
        );
        assert_eq!(
            FormQuestion::new("Bio", QuestionStyle::Paragraph, true, None, Some(5000), None),
            Err(FormError::InvalidLength { min: 0, max: 5000 })
        );
    }

    #[test]
    fn question_limit() {
        let mut form = form_with(MAX_QUESTIONS);
        assert_eq!(
            form.add_question(short("One more")),
            Err(FormError::TooManyQuestions)
        );
    }

    #[test]
    fn pages_hold_five_questions() {
        let form = form_with(12);
        assert_eq!(form.page_count(), 3);
        assert_eq!(form.pages(), vec![0..5, 5..10, 10..12]);
        assert_eq!(form_with(0).page_count(), 0);
        assert_eq!(form_with(5).page_count(), 1);
    }

    #[test]
    fn modal_uses_global_input_ids() {
        let form = form_with(7);
        let modal = serde_json::to_value(form.modal(1).unwrap()).unwrap();
        assert_eq!(modal["custom_id"], "form:submit:3:1");
        assert_eq!(modal["title"], "Staff application (2/2)");
        let rows = modal["components"].as_array().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["components"][0]["custom_id"], "q5");
        assert!(form.modal(2).is_err());
    }

    #[test]
    fn answers_are_checked_against_questions() {
        let mut form = form_with(1);
        form.add_question(
            FormQuestion::new("Why us?", QuestionStyle::Paragraph, false, Some(10), None, None)
                .unwrap(),
        )
        .unwrap();

        assert_eq!(
            form.validate_answers(0, &["".into(), "".into()]),
            Err(FormError::MissingAnswer("Question 1".into()))
        );
        assert_eq!(
            form.validate_answers(0, &["yes".into(), "short".into()]),
            Err(FormError::AnswerTooShort {
                label: "Why us?".into(),
                min: 10
            })
        );
        assert!(form.validate_answers(0, &["yes".into(), "".into()]).is_ok());
    }

    #[test]
    fn opening_needs_questions_and_channel() {
        let mut form = form_with(0);
        assert_eq!(form.set_open(true), Err(FormError::NoQuestions));
        form.add_question(short("Name")).unwrap();
        assert_eq!(form.set_open(true), Err(FormError::NoResponseChannel));
        form.response_channel = Some(LazyChannel(serenity::all::ChannelId::new(9)));
        assert!(form.set_open(true).is_ok());
        form.remove_question(1).unwrap();
        assert!(!form.open);
    }

    #[test]
    fn sessions_collect_pages_in_order() {
        let sessions = FormSessions::new();
        let user = UserId::new(10);
        let now = Utc::now();

        assert_eq!(
            sessions.record_page(user, 3, 0, vec!["a".into()], 2, now),
            Ok(None)
        );
        assert_eq!(
            sessions.record_page(user, 3, 1, vec!["b".into()], 2, now),
            Ok(Some(vec!["a".to_string(), "b".to_string()]))
        );
        // Session is gone once complete.
        assert_eq!(
            sessions.record_page(user, 3, 1, vec!["b".into()], 2, now),
            Err(FormError::SessionExpired)
        );
    }

    #[test]
    fn reopened_session_takes_the_last_page_again() {
        let sessions = FormSessions::new();
        let user = UserId::new(10);
        let now = Utc::now();
        sessions
            .record_page(user, 3, 0, vec!["a".into()], 2, now)
            .unwrap();
        let all = sessions
            .record_page(user, 3, 1, vec!["b".into()], 2, now)
            .unwrap()
            .unwrap();

        sessions.reopen(user, 3, 1, all[..1].to_vec(), now);
        assert_eq!(
            sessions.record_page(user, 3, 1, vec!["c".into()], 2, now),
            Ok(Some(vec!["a".to_string(), "c".to_string()]))
        );
    }

    #[test]
    fn sessions_expire() {
        let sessions = FormSessions::new();
        let user = UserId::new(10);
        let now = Utc::now();
        sessions
            .record_page(user, 3, 0, vec!["a".into()], 2, now)
            .unwrap();

        let later = now + Duration::minutes(FormSessions::TTL_MINUTES + 1);
        assert_eq!(
            sessions.record_page(user, 3, 1, vec!["b".into()], 2, later),
            Err(FormError::SessionExpired)
        );
        assert_eq!(sessions.prune(later), 0);
    }

    #[test]
    fn response_pairs_answers_with_questions() {
        let form = form_with(2);
        let response = FormResponse::new(&form, UserId::new(10), vec!["Ann".into()], Utc::now());
        assert_eq!(response.answers.len(), 2);
        assert_eq!(response.answers[1].answer, "");

        let embed = serde_json::to_value(response.to_embed(&form.name, 0xFFFFFF)).unwrap();
        assert_eq!(embed["fields"][1]["value"], "*No answer*");
        assert_eq!(form.responses_path(), "guilds/1/forms/3/responses");
    }
}
