// All prompt templates for the recommendation pipeline.
// Templates use {placeholder} syntax filled at call time by `llm_client::prompts::render`.

// ────────────────────────────────────────────────────────────────────────────
// Query extraction
// ────────────────────────────────────────────────────────────────────────────

pub const EXTRACT_ROLE: &str =
    "You are an expert recruiter who maps job descriptions to pre-employment assessments.";

pub const EXTRACT_PROMPT_TEMPLATE: &str = r#"Read the job description below and extract the hiring requirements as JSON.

JOB DESCRIPTION:
{job_text}

Return JSON with exactly these fields:
{
  "role": "short job title, or an empty string if none is stated",
  "required_skills": ["technical or soft skills the candidate must be tested on"],
  "max_duration": <integer minutes if the text limits test length, otherwise null>,
  "preferred_test_types": ["test categories the text asks for"],
  "remote_testing": <true if tests must be taken remotely, otherwise null>,
  "adaptive_support": <true if adaptive/IRT tests are requested, otherwise null>
}

Rules:
- Use only these test categories when the text implies one: "Ability & Aptitude",
  "Biodata & Situational Judgement", "Competencies", "Development & 360",
  "Assessment Exercises", "Knowledge & Skills", "Personality & Behavior", "Simulations".
  A request for a cognitive ability test is "Ability & Aptitude".
- "under 30 minutes", "no more than half an hour" and "max 30 mins" all mean max_duration 30.
  "an hour" means 60.
- Do not invent constraints the text does not state. Use null or [] instead.
- Keep skill names short ("Java", "SQL", "stakeholder management")."#;

// ────────────────────────────────────────────────────────────────────────────
// Reranking
// ────────────────────────────────────────────────────────────────────────────

pub const RERANK_ROLE: &str = "You are selecting the most relevant assessments for a job.";

pub const RERANK_PROMPT_TEMPLATE: &str = r#"Job requirement:
{query}

Assessments:
{assessments}

Return ONLY a JSON array of assessment numbers (1-based), most relevant first.
Maximum {limit}.

Example:
[1, 3, 5]"#;

/// One numbered candidate block inside the rerank prompt.
pub const RERANK_CANDIDATE_TEMPLATE: &str = "Assessment {index}:
Name: {name}
Description: {description}
Test Types: {test_types}
Duration: {duration}";
