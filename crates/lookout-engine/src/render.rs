//! Message rendering.
//!
//! A pure function from (rule, search response, trigger time) to the
//! human-readable alert body. The template is selected from the rule's index
//! pattern; the first returned hit serves as the example document. Field
//! extraction is defensive throughout: a missing field renders as empty,
//! never as an error.

use chrono::{DateTime, Utc};

use lookout_common::path::{get_int, get_local_time, get_map, get_str, format_local_time, path_lookup};
use lookout_common::types::{Rule, SearchResponse};

const LOG_EXCERPT_LIMIT: usize = 500;

enum Template {
    Events,
    Logging,
    Auditing,
    Default,
}

fn detect_template(index_pattern: &str) -> Template {
    if index_pattern.contains("events") {
        Template::Events
    } else if index_pattern.contains("logging") {
        Template::Logging
    } else if index_pattern.contains("auditing") {
        Template::Auditing
    } else {
        Template::Default
    }
}

/// Renders the alert message for a tripped rule.
///
/// When the rule carries custom text, `${path.to.field}` placeholders are
/// interpolated against the example document and a "Data fields" listing of
/// the rule's requested paths is appended; the template-selected body always
/// follows so a terse custom line still ships its context.
pub fn render(rule: &Rule, response: &SearchResponse, now: DateTime<Utc>) -> String {
    let body = match detect_template(&rule.index) {
        Template::Events => render_events(rule, response),
        Template::Logging => {
            if rule.name.to_lowercase().contains("system component") {
                render_system_component_logging(rule, response)
            } else {
                render_logging(rule, response)
            }
        }
        Template::Auditing => render_auditing(rule, response),
        Template::Default => render_default(rule, response, now),
    };

    match rule.custom_text.as_deref() {
        Some(text) if !text.is_empty() => {
            let custom = render_custom(rule, text, response);
            if custom.is_empty() {
                body
            } else {
                format!("{custom}\n\n{body}")
            }
        }
        _ => body,
    }
}

fn render_custom(rule: &Rule, text: &str, response: &SearchResponse) -> String {
    let empty = serde_json::Value::Null;
    let source = response.sample_source().unwrap_or(&empty);

    let mut out = interpolate(text, source);

    let args: Vec<&str> = rule
        .custom_args
        .iter()
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    if args.is_empty() {
        return out;
    }

    out.push_str("\n\nData fields:\n");
    for path in args {
        out.push_str(&format!("- {}: {}\n", path, path_lookup(source, path)));
    }
    out
}

/// Replaces `${path.to.field}` spans with values from the example document.
/// An unterminated placeholder is passed through untouched.
fn interpolate(text: &str, source: &serde_json::Value) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(len) => {
                let path = rest[start + 2..start + 2 + len].trim();
                out.push_str(&path_lookup(source, path));
                rest = &rest[start + 2 + len + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(max).collect();
        out.push_str("...");
        out
    }
}

fn render_events(rule: &Rule, response: &SearchResponse) -> String {
    let Some(hit) = response.sample_source() else {
        return format!(
            "Rule {} tripped with {} matching event records",
            rule.name,
            response.total()
        );
    };

    let involved = get_map(hit, "involvedObject");

    format!(
        "🚨 **Kubernetes Event Alert**\n\n\
         **Rule:** {rule_name}\n\
         **Event type:** {event_type}\n\
         **Reason:** {reason}\n\
         **Object kind:** {kind}\n\
         **Object name:** {object_name}\n\
         **Namespace:** {namespace}\n\
         **Message:** {message}\n\
         **First seen:** {first}\n\
         **Last seen:** {last}\n\
         **Occurrences:** {occurrences}\n\
         **Matched records:** {total}",
        rule_name = rule.name,
        event_type = get_str(hit, "type"),
        reason = get_str(hit, "reason"),
        kind = get_str(involved, "kind"),
        object_name = get_str(involved, "name"),
        namespace = get_str(involved, "namespace"),
        message = get_str(hit, "message"),
        first = get_local_time(hit, "firstTimestamp"),
        last = get_local_time(hit, "lastTimestamp"),
        occurrences = get_int(hit, "count"),
        total = response.total(),
    )
}

fn logging_header(title: &str, rule: &Rule, response: &SearchResponse) -> String {
    format!(
        "🚨 **{title}**\n\n\
         **Window:** last {minutes} minutes\n\
         **Threshold:** {threshold}\n\
         **Matched:** {total}",
        minutes = rule.timeframe / 60,
        threshold = rule.threshold,
        total = response.total(),
    )
}

fn logging_excerpt(hit: &serde_json::Value, total: i64, noun: &str) -> String {
    let log = truncate_chars(get_str(hit, "log"), LOG_EXCERPT_LIMIT);
    format!(
        "\n**Log time:** {time}\n\
         **Log excerpt:**\n\
         ```\n{log}\n```\n\
         Shown is 1 example of {total} matching {noun}",
        time = get_local_time(hit, "@timestamp"),
    )
}

fn render_logging(rule: &Rule, response: &SearchResponse) -> String {
    let Some(hit) = response.sample_source() else {
        return format!(
            "Rule {} tripped with {} matching log records",
            rule.name,
            response.total()
        );
    };

    let title = if rule.name.to_lowercase().contains("pod") {
        "Pod Log Alert"
    } else {
        "Application Log Alert"
    };
    let mut message = logging_header(title, rule, response);

    let kube = get_map(hit, "kubernetes");
    let pod = get_str(kube, "pod_name");
    if !pod.is_empty() {
        message.push_str(&format!(
            "\n\n**Pod:** {pod}\n\
             **Namespace:** {namespace}\n\
             **Container:** {container}",
            namespace = get_str(kube, "namespace_name"),
            container = get_str(kube, "container_name"),
        ));
        let image = get_str(kube, "container_image");
        if !image.is_empty() {
            message.push_str(&format!("\n**Image:** {image}"));
        }
    }

    message.push_str(&logging_excerpt(hit, response.total(), "log lines"));
    message
}

fn render_system_component_logging(rule: &Rule, response: &SearchResponse) -> String {
    let Some(hit) = response.sample_source() else {
        return format!(
            "Rule {} tripped with {} matching system component log records",
            rule.name,
            response.total()
        );
    };

    let mut message = logging_header("System Component Log Alert", rule, response);

    let kube = get_map(hit, "kubernetes");
    let pod = get_str(kube, "pod_name");
    if !pod.is_empty() {
        message.push_str(&format!(
            "\n\n**Node:** {pod}\n\
             **Namespace:** {namespace}\n\
             **Component:** {component}",
            namespace = get_str(kube, "namespace_name"),
            component = get_str(kube, "container_name"),
        ));
        let image = get_str(kube, "container_image");
        if !image.is_empty() {
            message.push_str(&format!("\n**Component image:** {image}"));
        }
    }

    message.push_str(&logging_excerpt(hit, response.total(), "component log lines"));
    message
}

fn render_auditing(rule: &Rule, response: &SearchResponse) -> String {
    let Some(hit) = response.sample_source() else {
        return format!(
            "Rule {} tripped with {} matching audit records",
            rule.name,
            response.total()
        );
    };

    let object_ref = get_map(hit, "ObjectRef");
    let user = get_map(hit, "User");
    let response_status = get_map(hit, "ResponseStatus");

    format!(
        "🚨 **Security Audit Alert**\n\n\
         **Rule:** {rule_name}\n\
         **Audit level:** {level}\n\
         **Verb:** {verb}\n\
         **Resource:** {resource}\n\
         **Resource name:** {object_name}\n\
         **Namespace:** {namespace}\n\
         **User:** {username} (UID: {uid})\n\
         **Response code:** {code}\n\
         **Message:** {message}\n\
         **Time:** {time}\n\
         **Matched records:** {total}",
        rule_name = rule.name,
        level = get_str(hit, "Level"),
        verb = get_str(hit, "Verb"),
        resource = get_str(object_ref, "Resource"),
        object_name = get_str(object_ref, "Name"),
        namespace = get_str(object_ref, "Namespace"),
        username = get_str(user, "Username"),
        uid = get_str(user, "UID"),
        code = get_int(response_status, "code"),
        message = get_str(hit, "Message"),
        time = get_local_time(hit, "@timestamp"),
        total = response.total(),
    )
}

fn render_default(rule: &Rule, response: &SearchResponse, now: DateTime<Utc>) -> String {
    format!(
        "🚨 **Search Store Alert**\n\n\
         **Rule:** {rule_name}\n\
         **Matched records:** {total}\n\
         **Time:** {time}\n\
         **Index pattern:** {index}",
        rule_name = rule.name,
        total = response.total(),
        time = format_local_time(&now.to_rfc3339()),
        index = rule.index,
    )
}
