//! Email template rendering engine.
//!
//! Handlebars-based rendering for outgoing notification emails. There is
//! a single versioned notification template; the stored records carry
//! the template id and version so a sent email can be traced back to the
//! copy it used.

use crate::error::{NotificationError, NotificationResult};
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Identifies a registered template and its revision.
#[derive(Debug, Clone, Copy)]
pub struct TemplateDescriptor {
    pub id: &'static str,
    pub version: i32,
}

/// The template every dispatch currently renders with.
pub const DEFAULT_EMAIL_TEMPLATE: TemplateDescriptor = TemplateDescriptor {
    id: "notification",
    version: 1,
};

/// Rendered email content.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    /// Email subject line.
    pub subject: String,
    /// HTML body content.
    pub html: String,
    /// Plain text body content.
    pub text: String,
}

/// Data handed to the notification template.
#[derive(Debug, Clone, Serialize)]
pub struct EmailTemplateData {
    pub recipient_name: String,
    pub title: String,
    pub body: String,
    pub deep_link_url: String,
    pub org_name: String,
}

/// Template engine for rendering notification emails.
pub struct TemplateRenderer {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateRenderer {
    /// Create a new renderer with all templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();

        handlebars
            .register_template_string("notification_html", NOTIFICATION_HTML_TEMPLATE)
            .map_err(|e| {
                NotificationError::Template(format!("Failed to register notification_html: {e}"))
            })?;
        handlebars
            .register_template_string("notification_text", NOTIFICATION_TEXT_TEMPLATE)
            .map_err(|e| {
                NotificationError::Template(format!("Failed to register notification_text: {e}"))
            })?;

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Render the notification email.
    pub fn render(&self, data: &EmailTemplateData) -> NotificationResult<RenderedEmail> {
        debug!(title = %data.title, "Rendering notification email");

        let html = self.handlebars.render("notification_html", data)?;
        let text = self.handlebars.render("notification_text", data)?;

        Ok(RenderedEmail {
            subject: data.title.clone(),
            html,
            text,
        })
    }
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new().expect("Failed to create default template renderer")
    }
}

// ============================================================================
// Email Templates
// ============================================================================

const NOTIFICATION_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{{title}}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 40px; box-shadow: 0 2px 4px rgba(0,0,0,0.1);">
        <h1 style="color: #18181b; font-size: 22px; font-weight: 600; margin: 0 0 16px 0;">
          {{title}}
        </h1>
        {{#if recipient_name}}
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 8px 0;">
          Hi {{recipient_name}},
        </p>
        {{/if}}
        <p style="color: #52525b; font-size: 16px; line-height: 24px; margin: 0 0 24px 0;">
          {{body}}
        </p>
        <table width="100%" cellspacing="0" cellpadding="0">
          <tr>
            <td style="text-align: center;">
              <a href="{{deep_link_url}}" style="display: inline-block; background-color: #2563eb; color: #ffffff; font-size: 16px; font-weight: 500; padding: 12px 32px; text-decoration: none; border-radius: 6px;">
                View in {{org_name}}
              </a>
            </td>
          </tr>
        </table>
      </td>
    </tr>
    <tr>
      <td style="padding: 24px 0; text-align: center;">
        <p style="color: #71717a; font-size: 12px; margin: 0 0 8px 0;">
          You're receiving this because of your notification settings in {{org_name}}.
        </p>
        <p style="color: #a1a1aa; font-size: 11px; margin: 0;">
          {{org_name}}
        </p>
      </td>
    </tr>
  </table>
</body>
</html>"#;

const NOTIFICATION_TEXT_TEMPLATE: &str = r#"{{title}}

{{#if recipient_name}}Hi {{recipient_name}},{{/if}}

{{body}}

View it here: {{deep_link_url}}

---
You're receiving this because of your notification settings in {{org_name}}."#;

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> EmailTemplateData {
        EmailTemplateData {
            recipient_name: "Alex".to_string(),
            title: "Task assigned to you".to_string(),
            body: "Dana assigned you the task \"File motion\"".to_string(),
            deep_link_url: "https://app.example.com/tasks/t_1".to_string(),
            org_name: "Chambers".to_string(),
        }
    }

    #[test]
    fn test_renderer_creation() {
        assert!(TemplateRenderer::new().is_ok());
    }

    #[test]
    fn test_render_notification_email() {
        let renderer = TemplateRenderer::new().unwrap();
        let rendered = renderer.render(&data()).unwrap();

        assert_eq!(rendered.subject, "Task assigned to you");
        assert!(rendered.html.contains("Alex"));
        assert!(rendered.html.contains("File motion"));
        assert!(rendered.text.contains("https://app.example.com/tasks/t_1"));
    }

    #[test]
    fn test_render_without_recipient_name() {
        let renderer = TemplateRenderer::new().unwrap();
        let rendered = renderer
            .render(&EmailTemplateData {
                recipient_name: String::new(),
                ..data()
            })
            .unwrap();

        assert!(!rendered.text.contains("Hi "));
    }
}
