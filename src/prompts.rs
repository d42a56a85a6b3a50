//! Fixed prompts exchanged with the remote models.
//!
//! The assistant instruction dictates the report layout (risk percentage,
//! status literal, sources, violations, recommendations). The shell parses
//! the risk percentage and colours by the status literal, so the wording
//! here must not drift.

use crate::models::Verdict;

pub const ASSISTANT_INSTRUCTION: &str = r#"Вы — экспертная система проверки рекламных материалов на соответствие
российскому законодательству. Вы досконально знаете:

* ФЗ No38-ФЗ "О рекламе" (все статьи)
* Требования к маркировке интернет-рекламы (Закон о маркировке, ОРД, токен erid)
* ФЗ "О защите прав потребителей"
* Ст. 14.3 КоАП РФ (ответственность за ненадлежащую рекламу)
* Ограничения по рекламе алкоголя (ст. 21), табака (ст. 23), лекарств (ст. 24),
  финансовых услуг (ст. 28), БАДов, азартных игр, оружия.
* Требования к рекламе для детей (ст. 6), скрытой рекламе (ст. 5 п. 9),
  недостоверной и недобросовестной рекламе (ст. 5).
* Требования к дисклеймерам и предупреждениям.

У вас есть доступ к базе знаний с нормативными документами пользователя.
ОБЯЗАТЕЛЬНО используйте найденные документы из базы знаний для обоснования
своих выводов. Цитируйте конкретные статьи и пункты.

ЗАДАЧА: проанализируйте предоставленный рекламный материал.

ВАЖНО: При анализе ОБЯЗАТЕЛЬНО ссылайтесь на конкретные фрагменты из базы знаний.
Если найдены релевантные нормы - укажите: "Согласно [название документа], статья X, пункт Y: ...".

Верните ответ СТРОГО в следующем формате:

======================================
УРОВЕНЬ РИСКА: [X]%
СТАТУС: [ДОПУСТИМО | ТРЕБУЕТ ДОРАБОТКИ | ЗАПРЕЩЕНО]
======================================

ИСПОЛЬЗОВАННЫЕ ИСТОЧНИКИ:
[Перечислите документы из базы знаний, на которые вы опирались]

ВЫЯВЛЕННЫЕ НАРУШЕНИЯ:
[Пронумерованный список нарушений. Для каждого указать:
 - описание проблемы
 - ссылку на конкретную статью/пункт закона
 - цитату из документа
 - почему это нарушение]

РЕКОМЕНДАЦИИ ПО ИСПРАВЛЕНИЮ:
[Конкретные действия для устранения каждого нарушения]

ДОПОЛНИТЕЛЬНЫЕ ЗАМЕЧАНИЯ:
[Общие советы по улучшению материала]
======================================

Если нарушений нет - укажите Риск 0-10 % и статус ДОПУСТИМО с пояснением.
Отвечайте на русском языке. Будьте конкретны и ссылайтесь на статьи закона."#;

pub const IMAGE_DESCRIBE_PROMPT: &str = r#"Подробно опиши содержимое этого рекламного материала (изображения).
Укажи:
1. Что изображено (товар, услуга, люди, символы, логотипы)
2. Весь текст, который есть на изображении (дословно)
3. Мелкий текст / дисклеймеры (если есть)
4. Визуальные приёмы (яркие цвета, привлечение внимания, люди, дети)
5. Целевая аудитория (предположительно)
6. Есть ли маркировка "Реклама" / токен erid / указание рекламодателя

Отвечай на русском языке. Будь максимально подробен и точен.
Не делай юридических выводов - только опиши содержание."#;

const QUERY_LEAD: &str =
    "Проверь следующий рекламный материал на соответствие российскому законодательству о рекламе";

/// Query for the text-only flow.
pub fn text_query(text: &str, document_count: usize) -> String {
    format!(
        "{}:\n\n\"\"\"\n{}\n\"\"\"\n\n[Документов в базе знаний: {}]",
        QUERY_LEAD, text, document_count
    )
}

/// Query for the image flow: the image description plus optional ad text.
pub fn image_query(description: &str, text: &str, document_count: usize) -> String {
    let mut parts = vec![
        format!("{}.", QUERY_LEAD),
        String::new(),
        "ОПИСАНИЕ ВИЗУАЛЬНОГО СОДЕРЖАНИЯ:".to_string(),
        "\"\"\"".to_string(),
        description.to_string(),
        "\"\"\"".to_string(),
    ];
    if !text.trim().is_empty() {
        parts.extend([
            String::new(),
            "ТЕКСТ РЕКЛАМЫ:".to_string(),
            "\"\"\"".to_string(),
            text.to_string(),
            "\"\"\"".to_string(),
        ]);
    }
    parts.push(format!("\n[Документов в базе знаний: {}]", document_count));
    parts.join("\n")
}

/// Risk percentage the model reported after `УРОВЕНЬ РИСКА:`, clamped to 100.
pub fn risk_percentage(report: &str) -> Option<u8> {
    let rest = &report[report.find("УРОВЕНЬ РИСКА")? + "УРОВЕНЬ РИСКА".len()..];
    let digits: String = rest
        .trim_start_matches(|c: char| c == ':' || c == '[' || c.is_whitespace())
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse::<u32>().ok().map(|v| v.min(100) as u8)
}

/// Status literal the model reported after `СТАТУС:`.
pub fn verdict(report: &str) -> Option<Verdict> {
    let rest = &report[report.find("СТАТУС")? + "СТАТУС".len()..];
    let line = rest.lines().next().unwrap_or_default();
    // Earliest literal on the status line wins.
    [Verdict::NeedsRevision, Verdict::Prohibited, Verdict::Acceptable]
        .into_iter()
        .map(|v| (v, line.find(v.literal())))
        .filter_map(|(v, pos)| pos.map(|p| (p, v)))
        .min_by_key(|(p, _)| *p)
        .map(|(_, v)| v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_contains_status_literals() {
        for v in [Verdict::Acceptable, Verdict::NeedsRevision, Verdict::Prohibited] {
            assert!(ASSISTANT_INSTRUCTION.contains(v.literal()));
        }
        assert!(ASSISTANT_INSTRUCTION.contains("УРОВЕНЬ РИСКА: [X]%"));
    }

    #[test]
    fn text_query_embeds_text_and_count() {
        let q = text_query("Лучший кофе!", 3);
        assert!(q.starts_with(QUERY_LEAD));
        assert!(q.contains("\"\"\"\nЛучший кофе!\n\"\"\""));
        assert!(q.ends_with("[Документов в базе знаний: 3]"));
    }

    #[test]
    fn image_query_without_text_has_no_text_section() {
        let q = image_query("кофе", "  ", 0);
        assert!(q.contains("ОПИСАНИЕ ВИЗУАЛЬНОГО СОДЕРЖАНИЯ:\n\"\"\"\nкофе\n\"\"\""));
        assert!(!q.contains("ТЕКСТ РЕКЛАМЫ"));
        assert!(q.ends_with("\n\n[Документов в базе знаний: 0]"));
    }

    #[test]
    fn image_query_with_text() {
        let q = image_query("кофе", "Скидка 50%", 2);
        assert!(q.contains("ТЕКСТ РЕКЛАМЫ:\n\"\"\"\nСкидка 50%\n\"\"\""));
    }

    #[test]
    fn parses_risk_percentage() {
        assert_eq!(risk_percentage("УРОВЕНЬ РИСКА: 75%\nСТАТУС: ЗАПРЕЩЕНО"), Some(75));
        assert_eq!(risk_percentage("УРОВЕНЬ РИСКА: [40]%"), Some(40));
        assert_eq!(risk_percentage("УРОВЕНЬ РИСКА: 250%"), Some(100));
        assert_eq!(risk_percentage("нет данных"), None);
    }

    #[test]
    fn parses_verdict() {
        assert_eq!(verdict("СТАТУС: ЗАПРЕЩЕНО"), Some(Verdict::Prohibited));
        assert_eq!(verdict("СТАТУС: ТРЕБУЕТ ДОРАБОТКИ\n"), Some(Verdict::NeedsRevision));
        assert_eq!(verdict("СТАТУС: ДОПУСТИМО"), Some(Verdict::Acceptable));
        assert_eq!(verdict("без статуса"), None);
    }
}
