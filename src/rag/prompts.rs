use crate::llm::{ChatMessage, ChatRequest};

const ANSWER_SYSTEM_TEMPLATE: &str = "Ты - экспертный русскоязычный AI-ассистент. Анализируй вопрос и контекст, следуя шагам:
1. Определи ключевые аспекты вопроса
2. Выдели релевантные части контекста
3. Сформулируй точный ответ и обязательно помести его между тегами <answer> и </answer>
4. Если нужно, укажи источник информации

Контекст:
{context}

Вопрос: {question}";

const VERIFICATION_SYSTEM_TEMPLATE: &str = "Проверь соответствие ответа контексту и вопросу. Ответ должен:
1. Быть основан только на контексте
2. Не содержать вымышленных фактов
3. Быть точным и конкретным
4. Полностью отвечать на заданный вопрос

Контекст:
{context}

Вопрос пользователя:
{question}

Ответ для проверки:
{response}";

const VERIFICATION_HUMAN_MESSAGE: &str = "Требуется ли корректировка ответа? Ответь \"да\" или \"нет\". Если да, предложи улучшенную версию ответа и обязательно помести эту версию между тегами <perfect_answer> и </perfect_answer>.";

/// Prompt for the first-pass answer.
pub fn answer_request(context: &str, question: &str) -> ChatRequest {
    let system = render(
        ANSWER_SYSTEM_TEMPLATE,
        &[("context", context), ("question", question)],
    );
    ChatRequest::new(vec![ChatMessage::system(system), ChatMessage::user(question)])
}

/// Prompt asking the model to judge and optionally correct a draft.
pub fn verification_request(context: &str, question: &str, draft_answer: &str) -> ChatRequest {
    let system = render(
        VERIFICATION_SYSTEM_TEMPLATE,
        &[
            ("context", context),
            ("question", question),
            ("response", draft_answer),
        ],
    );
    ChatRequest::new(vec![
        ChatMessage::system(system),
        ChatMessage::user(VERIFICATION_HUMAN_MESSAGE),
    ])
}

/// Single-pass `{name}` substitution; substituted text is never rescanned.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let replaced = after.find('}').and_then(|close| {
            let name = &after[..close];
            values
                .iter()
                .find(|(key, _)| *key == name)
                .map(|(_, value)| (*value, close))
        });
        match replaced {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
