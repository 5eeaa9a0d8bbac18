use crate::error::QuizError;
use crate::models::{Quiz, StoredQuiz, QUIZ_OPTION_COUNT};
use crate::traits::{LanguageModel, QuizStore};
use tracing::{info, warn};

pub const DEFAULT_QUIZ_QUESTIONS: usize = 5;

pub fn quiz_prompt(topic: &str, context: &str, num_questions: usize) -> String {
    format!(
        "Based on the following context about {topic}, generate a {num_questions}-question multiple choice quiz.\n\
         Format your response strictly as a JSON object with the following structure, no extra comments:\n\
         {{\n  \"quiz_title\": \"Quiz about [topic]\",\n  \"questions\": [\n    {{\n      \"question\": \"Question text\",\n      \"options\": [\"Option 1\", \"Option 2\", \"Option 3\", \"Option 4\"],\n      \"correct_answer\": 0\n    }}\n  ]\n}}\n\
         \"correct_answer\" is the zero-based index of the correct option (0-3).\n\n\
         Context:\n{context}\n"
    )
}

/// Generates a quiz with one model call and persists it once it validates.
pub struct QuizGenerator<L, S> {
    llm: L,
    store: S,
}

impl<L, S> QuizGenerator<L, S>
where
    L: LanguageModel,
    S: QuizStore,
{
    pub fn new(llm: L, store: S) -> Self {
        Self { llm, store }
    }

    pub async fn generate(
        &self,
        topic: &str,
        context: &str,
        num_questions: usize,
    ) -> Result<StoredQuiz, QuizError> {
        if topic.trim().is_empty() {
            return Err(QuizError::InvalidArgument("topic is empty".to_string()));
        }
        if num_questions == 0 {
            return Err(QuizError::InvalidArgument(
                "a quiz needs at least one question".to_string(),
            ));
        }
        if context.trim().is_empty() {
            warn!(topic, "generating quiz without supporting context");
        }

        let raw = self
            .llm
            .complete(&quiz_prompt(topic, context, num_questions))
            .await
            .map_err(|source| QuizError::Generation {
                topic: topic.to_string(),
                source,
            })?;

        let quiz = parse_quiz(topic, &raw)?;
        if quiz.questions.len() != num_questions {
            warn!(
                topic,
                requested = num_questions,
                generated = quiz.questions.len(),
                "quiz question count differs from request"
            );
        }

        let stored = self
            .store
            .save(topic, &quiz)
            .await
            .map_err(|source| QuizError::Persistence {
                topic: topic.to_string(),
                source,
            })?;

        info!(topic, quiz_id = stored.id, questions = stored.quiz.questions.len(), "quiz stored");
        Ok(stored)
    }
}

/// Parses and validates a model response into a [`Quiz`].
///
/// The outermost JSON object is taken from the response, so surrounding prose
/// or code fences are tolerated. Anything else that does not match the quiz
/// shape is a [`QuizError::Format`].
pub fn parse_quiz(topic: &str, raw: &str) -> Result<Quiz, QuizError> {
    let format_error = |details: String| QuizError::Format {
        topic: topic.to_string(),
        details,
    };

    let (Some(start), Some(end)) = (raw.find('{'), raw.rfind('}')) else {
        return Err(format_error("response contains no JSON object".to_string()));
    };
    if end < start {
        return Err(format_error("response contains no JSON object".to_string()));
    }

    let quiz: Quiz = serde_json::from_str(&raw[start..=end])
        .map_err(|error| format_error(error.to_string()))?;

    if quiz.title.trim().is_empty() {
        return Err(format_error("quiz_title is empty".to_string()));
    }
    if quiz.questions.is_empty() {
        return Err(format_error("quiz has no questions".to_string()));
    }

    for (position, question) in quiz.questions.iter().enumerate() {
        let number = position + 1;
        if question.question.trim().is_empty() {
            return Err(format_error(format!("question {number} has no text")));
        }
        if question.options.len() != QUIZ_OPTION_COUNT {
            return Err(format_error(format!(
                "question {number} has {} options, expected {QUIZ_OPTION_COUNT}",
                question.options.len()
            )));
        }
        if question.correct_answer >= question.options.len() {
            return Err(format_error(format!(
                "question {number} correct_answer {} is out of range 0..{}",
                question.correct_answer,
                question.options.len()
            )));
        }
    }

    Ok(quiz)
}
