//! Human-actionable messages for remote failures.
//!
//! [`remediation_hint`] turns a raw remote error description into text a
//! user can act on, keyed by the status code names the knowledge service
//! reports. [`connection_report`] renders the result of the connection test
//! offered by the shell.

/// Known status codes and what the user should do about each.
const HINTS: [(&str, &str); 5] = [
    (
        "PERMISSION_DENIED",
        "Доступ запрещён. Проверьте:\n\
         \x20 1) API-ключ корректный (не OAuth-токен)\n\
         \x20 2) API-ключ привязан к сервисному аккаунту с ролями:\n\
         \x20    - ai.editor (или ai.admin)\n\
         \x20    - ai.assistants.editor\n\
         \x20 3) Folder ID - правильный\n\
         \x20 4) Сервисный аккаунт состоит в этом каталоге",
    ),
    (
        "UNAUTHENTICATED",
        "Не авторизован. API-ключ недействителен или истёк.\n\
         Создайте новый ключ на https://console.yandex.cloud/",
    ),
    ("NOT_FOUND", "Ресурс не найден. Проверьте Folder ID."),
    (
        "INVALID_ARGUMENT",
        "Неверный аргумент. Файл повреждён или формат не поддерживается.",
    ),
    (
        "RESOURCE_EXHAUSTED",
        "Лимит исчерпан. Подождите или увеличьте квоту.",
    ),
];

/// First `max` characters of `s`.
pub fn excerpt(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

/// Remediation hint for a known status code, or `None`.
pub fn hint_for(message: &str) -> Option<&'static str> {
    HINTS
        .iter()
        .find(|(code, _)| message.contains(code))
        .map(|(_, hint)| *hint)
}

/// A user-facing rendering of a remote error message: the hint followed by
/// the start of the original message, or just the start of the message when
/// no code is recognised.
pub fn remediation_hint(message: &str) -> String {
    match hint_for(message) {
        Some(hint) => format!("{}\n\nОригинал: {}", hint, excerpt(message, 200)),
        None => excerpt(message, 300),
    }
}

/// Outcome of one connection probe.
#[derive(Debug, Clone)]
pub struct Probe {
    pub label: &'static str,
    pub error: Option<String>,
}

impl Probe {
    pub fn ok(&self) -> bool {
        self.error.is_none()
    }
}

/// `"ok"` when every probe passed, otherwise a multi-line diagnostic report.
pub fn connection_report(probes: &[Probe]) -> String {
    if probes.iter().all(Probe::ok) {
        return "ok".to_string();
    }

    let mut lines = vec![
        "=== Диагностика Yandex Cloud ===".to_string(),
        String::new(),
    ];
    for probe in probes {
        lines.push(format!(
            "[{}] {}",
            if probe.ok() { "OK" } else { "FAIL" },
            probe.label
        ));
        if let Some(err) = &probe.error {
            lines.push(format!("    -> {}", detail(err)));
        }
    }
    lines.push(String::new());

    let all_errors: String = probes
        .iter()
        .filter_map(|p| p.error.as_deref())
        .collect::<Vec<_>>()
        .join("\n");
    if all_errors.contains("PERMISSION_DENIED") {
        lines.extend(
            [
                "Роли назначены сервисному аккаунту?",
                "Нужные роли:",
                "  - ai.assistants.editor",
                "  - ai.editor (или ai.admin)",
            ]
            .map(str::to_string),
        );
    } else if all_errors.contains("UNAUTHENTICATED") {
        lines.push("API-ключ недействителен.".to_string());
    }

    let raw = probes
        .iter()
        .find_map(|p| p.error.as_deref())
        .unwrap_or_default();
    lines.push(String::new());
    lines.push("=== Raw ===".to_string());
    lines.push(excerpt(raw, 300));
    lines.join("\n")
}

/// The `detail = "..."` part of a gRPC-style message if present, else its start.
fn detail(err: &str) -> String {
    if let Some(pos) = err.find("detail") {
        let rest = err[pos + "detail".len()..].trim_start();
        if let Some(rest) = rest.strip_prefix('=') {
            let rest = rest.trim_start();
            if let Some(quoted) = rest.strip_prefix('"') {
                if let Some(end) = quoted.find('"') {
                    return quoted[..end].to_string();
                }
            }
        }
    }
    excerpt(err, 150)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_code_gets_hint_and_original() {
        let msg = remediation_hint("PERMISSION_DENIED (HTTP 403): no ai.editor role");
        assert!(msg.starts_with("Доступ запрещён."));
        assert!(msg.contains("Оригинал: PERMISSION_DENIED (HTTP 403)"));
    }

    #[test]
    fn unknown_code_is_truncated_message() {
        let long = "x".repeat(500);
        assert_eq!(remediation_hint(&long).chars().count(), 300);
    }

    #[test]
    fn every_code_has_a_hint() {
        for code in [
            "PERMISSION_DENIED",
            "UNAUTHENTICATED",
            "NOT_FOUND",
            "INVALID_ARGUMENT",
            "RESOURCE_EXHAUSTED",
        ] {
            assert!(hint_for(code).is_some(), "{}", code);
        }
    }

    #[test]
    fn all_probes_ok() {
        let probes = [
            Probe { label: "files", error: None },
            Probe { label: "indexes", error: None },
        ];
        assert_eq!(connection_report(&probes), "ok");
    }

    #[test]
    fn failed_probe_report() {
        let probes = [
            Probe {
                label: "Файлы (files.list)",
                error: Some(r#"PERMISSION_DENIED: detail = "no access to folder""#.to_string()),
            },
            Probe { label: "Индексы (search_indexes.list)", error: None },
        ];
        let report = connection_report(&probes);
        assert!(report.contains("[FAIL] Файлы (files.list)"));
        assert!(report.contains("    -> no access to folder"));
        assert!(report.contains("[OK] Индексы (search_indexes.list)"));
        assert!(report.contains("ai.assistants.editor"));
        assert!(report.contains("=== Raw ==="));
    }

    #[test]
    fn excerpt_counts_characters() {
        assert_eq!(excerpt("Реклама", 3), "Рек");
    }
}
