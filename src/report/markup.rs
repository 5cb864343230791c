//! HTML fragment for the query report.
//!
//! Element ids and class names are read by the dashboard's CSS and modal
//! script; keep them stable.

use super::{formatter::escape_html, Report};

pub const TABLE_ID: &str = "peek_activerecord_table";
pub const MODAL_ID: &str = "activeRecordQueriesModal";
pub const MODAL_TITLE_ID: &str = "activeRecordQueriesModalTitle";

const TABLE_HEAD: &str = "<div class='ar_instrumentation' id='peek_activerecord_table'>\n\
<table class='table table-borderless'>\n\
<thead>\n\
<tr>\n\
<th class=duration-header>Duration</th>\n\
<th class=cached-header>Cached</th>\n\
<th class=sql-header>SQL</th>\n\
</tr>\n\
</thead>\n\
<tbody>\n";

const TABLE_TAIL: &str = "</tbody></table></div>\n";

fn push_table(html: &mut String, report: &Report) {
    html.push_str(TABLE_HEAD);
    for row in &report.rows {
        html.push_str("<tr>\n<td class=duration-data>");
        html.push_str(&row.duration_label());
        html.push_str("</td>\n<td class=cache-data>");
        html.push_str(if row.cached { "true" } else { "false" });
        html.push_str("</td>\n<td class=sql-data>");
        html.push_str(&row.sql_html);
        html.push_str("</td>\n</tr>\n");
    }
    html.push_str(TABLE_TAIL);
}

/// Render the self-contained modal fragment appended to the page.
pub fn render_fragment(report: &Report, title: &str) -> String {
    let sql_len: usize = report.rows.iter().map(|r| r.sql_html.len()).sum();
    let mut html = String::with_capacity(1024 + sql_len + report.rows.len() * 128);

    html.push_str("<div class=\"modal fade\" id=\"");
    html.push_str(MODAL_ID);
    html.push_str("\" tabindex=\"-1\" role=\"dialog\" aria-labelledby=\"");
    html.push_str(MODAL_TITLE_ID);
    html.push_str("\" aria-hidden=\"true\">\n");
    html.push_str(
        "<div class=\"modal-dialog modal-xl modal-dialog-scrollable\" role=\"document\">\n\
         <div class=\"modal-content\">\n\
         <div class=\"modal-header\">\n",
    );
    html.push_str("<h5 class=\"modal-title\" id=\"");
    html.push_str(MODAL_TITLE_ID);
    html.push_str("\">");
    html.push_str(&escape_html(title));
    html.push_str("</h5>\n");
    html.push_str(
        "<button type=\"button\" class=\"close\" data-dismiss=\"modal\" aria-label=\"Close\">\n\
         <span aria-hidden=\"true\">&times;</span>\n\
         </button>\n\
         </div>\n\
         <div class=\"modal-body\">\n",
    );
    push_table(&mut html, report);
    html.push_str("</div>\n</div>\n</div>\n</div>\n");
    html
}
