//! Instruction prompt for the grading model (Mistral-Instruct chat format).

/// Closes the instruction block; anything before it in the generated text is prompt echo.
pub(crate) const INSTRUCTION_END_MARKER: &str = "[/INST]";

const JSON_SCHEMA_HINT: &str = r#"{
  "band_score": float,
  "overall_analysis": {
    "TaskAchievement": float,
    "CoherenceAndCohesion": float,
    "LexicalResource": float,
    "GrammaticalRangeAndAccuracy": float,
    "summary": "string"
  },
  "grammar_errors": [
    {
      "original_text": "string",
      "corrected_text": "string",
      "error_type": "string",
      "explanation_en": "string",
      "explanation_vn": "string",
      "mapped_type": "string (must be one of: Grammar, Vocabulary, Style, Punctuation)",
      "start_index": "int (character index in the essay, starting at 0)",
      "end_index": "int (character index in the essay)"
    }
  ],
  "paraphrasing_suggestions": {
    "original_sentence": "string",
    "suggestion": "string"
  }
}"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Task1,
    Task2,
}

impl TaskKind {
    /// `Task1` / `Task 1` select Task 1; every other topic type is graded as Task 2.
    pub(crate) fn from_topic_type(topic_type: &str) -> Self {
        let compact: String =
            topic_type.chars().filter(|c| !c.is_whitespace()).collect::<String>().to_lowercase();
        if compact == "task1" {
            TaskKind::Task1
        } else {
            TaskKind::Task2
        }
    }

    fn criteria(self) -> &'static str {
        match self {
            TaskKind::Task1 => {
                "Task Achievement, Coherence and Cohesion, Lexical Resource, Grammatical Range and Accuracy."
            }
            TaskKind::Task2 => {
                "Task Response, Coherence and Cohesion, Lexical Resource, Grammatical Range and Accuracy."
            }
        }
    }

    fn goal(self) -> &'static str {
        match self {
            TaskKind::Task1 => {
                "analyze the provided data/graph description and report the main features, and provide a comprehensive band score based on Task 1 requirements (reporting, summarizing, and describing data)."
            }
            TaskKind::Task2 => {
                "analyze the user's argument and thesis, and provide a comprehensive band score based on Task 2 requirements (argument development, position, and support)."
            }
        }
    }

    fn hint(self) -> &'static str {
        match self {
            TaskKind::Task1 => {
                "Remember, Task 1 focuses on accurately reporting and summarizing the data, not stating opinions or arguments."
            }
            TaskKind::Task2 => {
                "Remember, Task 2 focuses on addressing all parts of the question and developing a clear, well-supported argument."
            }
        }
    }

    fn first_criterion(self) -> &'static str {
        match self {
            TaskKind::Task1 => "Task Achievement",
            TaskKind::Task2 => "Task Response",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PromptInput<'a> {
    pub(crate) topic_text: &'a str,
    pub(crate) content: &'a str,
    pub(crate) topic_type: &'a str,
    pub(crate) sample_answer: Option<&'a str>,
}

pub(crate) fn build_prompt(input: &PromptInput<'_>) -> String {
    let kind = TaskKind::from_topic_type(input.topic_type);
    let system = system_prompt(input.topic_type, kind);
    let user = user_message(input, kind);
    format!("<s>[INST] <<SYS>>\n{system}\n<</SYS>>\n\n{user} {INSTRUCTION_END_MARKER}")
}

fn system_prompt(topic_type: &str, kind: TaskKind) -> String {
    let criteria = kind.criteria();
    let goal = kind.goal();
    let hint = kind.hint();
    let first = kind.first_criterion();

    format!(
        "You are an expert IELTS Writing Examiner specializing in **{topic_type}**. Your task is to {goal}

You MUST output a single, valid JSON object. DO NOT include any text outside the JSON object.

The analysis MUST cover the four official IELTS criteria: **{criteria}**
CRITICAL: All band scores (overall_score and individual criterion scores) MUST be between 1.0 and 9.0. They must only be integers or half-integers (e.g., 6.0, 6.5, 7.0, 7.5). Scores like 9.5 or 7.2 are invalid.

{hint}

**CRITICAL INSTRUCTIONS FOR overall_analysis:**
1. The first criterion score, **'{first}'**, MUST use the JSON key **TaskAchievement** for schema compatibility.
2. Ensure the score for this criterion reflects the degree of achievement of the task (Task 1) or response to the task (Task 2).

---
**CRITICAL INSTRUCTIONS FOR grammar_errors ARRAY:**
1. This array MUST be filled with **at least 5 relevant errors** from the user's essay, unless fewer than 5 errors exist. You MUST identify grammar, vocabulary, and style errors.
2. For every error found, you MUST determine its character position in the ESSAY CONTENT.
3. Provide the **start_index** and **end_index** of the error in the original essay content (counting from 0). This is essential for highlighting in the frontend.
4. The **mapped_type** MUST be one of the following four categories: **Grammar**, **Vocabulary**, **Style**, or **Punctuation**.

---
**CRITICAL INSTRUCTIONS FOR paraphrasing_suggestions:**
1. You MUST select **one complex or repetitive sentence** from the user's essay.
2. Fill the `original_sentence` and provide a better, more advanced alternative in `suggestion` to improve Lexical Resource score.
---

The JSON structure MUST strictly adhere to this schema:
{JSON_SCHEMA_HINT}
"
    )
}

fn user_message(input: &PromptInput<'_>, kind: TaskKind) -> String {
    let topic_type = input.topic_type;
    let topic_text = input.topic_text;
    let content = input.content;

    match (kind, input.sample_answer.filter(|sample| !sample.trim().is_empty())) {
        (TaskKind::Task1, Some(sample)) => format!(
            "The Task Type is: {topic_type}\n\nHere is the Task Instructions:\n---\n{topic_text}\n---\n\nHere is the Sample Answer (data description):\n---\n{sample}\n---\n\nHere is the user's essay:\n---\n{content}\n---"
        ),
        _ => format!(
            "The Task Type is: {topic_type}\n\nHere is the Topic to be addressed:\n---\n{topic_text}\n---\n\nHere is the user's essay:\n---\n{content}\n---"
        ),
    }
}
