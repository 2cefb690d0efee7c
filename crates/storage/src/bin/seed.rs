use std::fmt;

use quiz_core::model::{
    AnswerKey, Difficulty, Question, QuestionId, QuestionOption, ReviewStatus,
};
use storage::repository::Storage;

#[derive(Debug, Clone)]
struct Args {
    db_url: String,
    exam_type: String,
    topic: String,
    questions: u32,
}

#[derive(Debug)]
enum ArgsError {
    MissingValue { flag: &'static str },
    UnknownArg(String),
    InvalidQuestions { raw: String },
}

impl fmt::Display for ArgsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgsError::MissingValue { flag } => write!(f, "{flag} requires a value"),
            ArgsError::UnknownArg(arg) => write!(f, "unknown argument: {arg}"),
            ArgsError::InvalidQuestions { raw } => write!(f, "invalid --questions value: {raw}"),
        }
    }
}

impl std::error::Error for ArgsError {}

fn require_value(
    args: &mut impl Iterator<Item = String>,
    flag: &'static str,
) -> Result<String, ArgsError> {
    args.next().ok_or(ArgsError::MissingValue { flag })
}

impl Args {
    fn parse() -> Result<Self, ArgsError> {
        let mut db_url =
            std::env::var("QUIZ_DB_URL").unwrap_or_else(|_| "sqlite:dev.sqlite3".into());
        let mut exam_type =
            std::env::var("QUIZ_EXAM_TYPE").unwrap_or_else(|_| "math-basic".into());
        let mut topic = std::env::var("QUIZ_TOPIC").unwrap_or_else(|_| "arithmetic".into());
        let mut questions = std::env::var("QUIZ_QUESTIONS")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(20);

        let mut args = std::env::args().skip(1);
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--db" => db_url = require_value(&mut args, "--db")?,
                "--exam-type" => exam_type = require_value(&mut args, "--exam-type")?,
                "--topic" => topic = require_value(&mut args, "--topic")?,
                "--questions" => {
                    let raw = require_value(&mut args, "--questions")?;
                    questions = raw
                        .parse::<u32>()
                        .map_err(|_| ArgsError::InvalidQuestions { raw })?;
                }
                other => return Err(ArgsError::UnknownArg(other.to_string())),
            }
        }

        Ok(Self {
            db_url,
            exam_type,
            topic,
            questions,
        })
    }
}

fn sample_question(id: u64, exam_type: &str, topic: &str) -> Question {
    let correct = AnswerKey::from_index(usize::try_from(id % 4).unwrap_or(0))
        .unwrap_or(AnswerKey::A);
    let options = (0..4)
        .map(|i| {
            if AnswerKey::from_index(i).ok() == Some(correct) {
                QuestionOption::with_rationale(format!("option {i} of #{id}"), "this one holds")
            } else {
                QuestionOption::new(format!("option {i} of #{id}"))
            }
        })
        .collect();
    let difficulty = match id % 3 {
        0 => Difficulty::Easy,
        1 => Difficulty::Medium,
        _ => Difficulty::Hard,
    };

    Question::new(
        QuestionId::new(id),
        format!("Seeded question #{id}: which option holds?"),
        options,
        correct,
        exam_type,
        topic,
        None,
        difficulty,
        ReviewStatus::Approved,
    )
    .expect("seed question should be valid")
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse()?;

    let storage = Storage::sqlite(&args.db_url).await?;
    for id in 1..=u64::from(args.questions) {
        let question = sample_question(id, &args.exam_type, &args.topic);
        storage.questions.upsert_question(&question).await?;
    }

    println!(
        "seeded {} approved questions for exam '{}' topic '{}' into {}",
        args.questions, args.exam_type, args.topic, args.db_url
    );
    Ok(())
}
