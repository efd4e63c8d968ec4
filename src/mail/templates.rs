use tera::{Context, Tera};

use super::{MailError, RenderedBody};

const LAYOUT: &str = "layout.html";

/// 编译期嵌入的邮件模板
///
/// `.html` 模板中的变量会被转义，`.txt` 模板原样输出。
pub struct Templates {
    engine: Tera,
}

impl Templates {
    pub fn new() -> Result<Self, MailError> {
        let mut engine = Tera::default();
        engine.add_raw_templates(vec![
            (LAYOUT, include_str!("templates/layout.html")),
            ("welcome.html", include_str!("templates/welcome.html")),
            ("welcome.txt", include_str!("templates/welcome.txt")),
        ])?;

        Ok(Self { engine })
    }

    /// 渲染 `{name}.txt` 和 `{name}.html` 两份正文
    pub fn render(&self, name: &str, context: &Context) -> Result<RenderedBody, MailError> {
        let text = self.engine.render(&format!("{name}.txt"), context)?;
        let html = self.engine.render(&format!("{name}.html"), context)?;

        Ok(RenderedBody {
            text,
            html: Some(html),
        })
    }

    /// 把 HTML 正文套入邮件布局，`body` 不再转义
    pub fn layout(&self, subject: &str, body: &str) -> Result<String, MailError> {
        let mut context = Context::new();
        context.insert("subject", subject);
        context.insert("body", body);

        Ok(self.engine.render(LAYOUT, &context)?)
    }
}
