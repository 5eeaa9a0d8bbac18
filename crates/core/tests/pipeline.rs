use async_trait::async_trait;
use course_tutor_core::{
    ingest_path, AnswerState, CodepointTokenizer, Confidence, EngineSettings, HashingEmbedder,
    IngestionOptions, LanguageModel, LlmError, LocalIndexStore, QuizStore, SqliteQuizStore,
    TutorEngine, VectorIndex, VideoResult, VideoSearch,
};
use std::fs;
use std::sync::Mutex;
use tempfile::tempdir;

const DERIVATIVE_NOTE: &str =
    "The derivative measures the instantaneous rate of change of a function.";

/// Rewrites known questions to fixed queries and answers every other prompt
/// with canned text.
struct ScriptedTutor;

#[async_trait]
impl LanguageModel for ScriptedTutor {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if prompt.starts_with("Rewrite the following student question") {
            if prompt.contains("derivative") {
                return Ok(DERIVATIVE_NOTE.to_string());
            }
            return Ok("zebra xylophone quartz".to_string());
        }
        if prompt.starts_with("Based on the following context") {
            return Ok(r#"```json
{"quiz_title": "Quiz about derivatives", "questions": [
  {"question": "What does a derivative measure?",
   "options": ["Area", "Rate of change", "Volume", "Mass"],
   "correct_answer": 1}
]}
```"#
                .to_string());
        }
        Ok("It measures how fast a function changes.".to_string())
    }
}

#[derive(Default)]
struct RecordingVideos {
    queries: Mutex<Vec<String>>,
}

#[async_trait]
impl VideoSearch for RecordingVideos {
    async fn search(&self, query: &str, _max_results: usize) -> Vec<VideoResult> {
        self.queries.lock().unwrap().push(query.to_string());
        Vec::new()
    }
}

#[tokio::test]
async fn ingest_ask_and_quiz_over_local_index() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = tempdir()?;
    let course = workspace.path().join("course");
    fs::create_dir_all(course.join("week1"))?;
    fs::write(course.join("week1/derivatives.md"), DERIVATIVE_NOTE)?;
    fs::write(
        course.join("photosynthesis.txt"),
        "Plants convert light into chemical energy inside chloroplasts.",
    )?;
    fs::write(course.join("syllabus.docx"), b"not supported")?;

    let index = LocalIndexStore::open(workspace.path().join("index")).await?;
    let embedder = HashingEmbedder::default();
    let report = ingest_path(
        &course,
        &IngestionOptions::new("calculus101", "calculus101"),
        &CodepointTokenizer,
        &embedder,
        &index,
    )
    .await?;
    assert_eq!(report.chunks_indexed, 2);
    assert_eq!(report.skipped.len(), 1);
    assert_eq!(index.count("calculus101").await?, 2);

    let quizzes = SqliteQuizStore::open(workspace.path().join("quizzes.db")).await?;
    let engine = TutorEngine::new(
        Box::new(embedder),
        index,
        ScriptedTutor,
        RecordingVideos::default(),
        &quizzes,
        EngineSettings::new("calculus101"),
    );

    let confident = engine.answer("what is a derivative?", false).await?;
    assert_eq!(confident.retrieval[0].metadata.source, "derivatives.md");
    assert!(confident.retrieval[0].score > 0.99);
    assert_eq!(confident.confidence, Confidence::High);
    assert_eq!(confident.state, AnswerState::Answered);
    assert_eq!(confident.answer, "It measures how fast a function changes.");

    let unsure = engine.answer("who won the 1998 world cup?", false).await?;
    let best = unsure.max_score().unwrap_or(0.0);
    assert_eq!(unsure.confidence == Confidence::High, best > 0.7);
    if unsure.confidence == Confidence::Low {
        assert_eq!(unsure.state, AnswerState::AnsweredWithEnrichment);
    }

    let stored = engine.generate_quiz("derivatives", None, 1).await?;
    assert_eq!(stored.quiz.title, "Quiz about derivatives");
    assert_eq!(stored.quiz.questions[0].correct_answer, 1);

    let listed = quizzes.list(10).await?;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, stored.id);
    Ok(())
}

#[tokio::test]
async fn index_survives_reopen_between_runs() -> Result<(), Box<dyn std::error::Error>> {
    let workspace = tempdir()?;
    let notes = workspace.path().join("notes.md");
    fs::write(&notes, DERIVATIVE_NOTE)?;
    let persist_dir = workspace.path().join("index");

    {
        let index = LocalIndexStore::open(&persist_dir).await?;
        ingest_path(
            &notes,
            &IngestionOptions::new("calculus101", "calculus101"),
            &CodepointTokenizer,
            &HashingEmbedder::default(),
            &index,
        )
        .await?;
    }

    let reopened = LocalIndexStore::open(&persist_dir).await?;
    let vector = HashingEmbedder::default().vector_for(DERIVATIVE_NOTE);
    let results = reopened.query("calculus101", &vector, 5).await?;
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].text, DERIVATIVE_NOTE);
    Ok(())
}
