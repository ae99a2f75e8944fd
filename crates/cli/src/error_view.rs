use crate::error::CliError;
use crate::output;
use crate::style::{Color, Style};
use crate::ui::Ui;

pub fn print(err: &CliError) {
    let style = Style::detect();
    let ui = Ui::new(style);

    output::error(ui.rule());
    output::error("Tidemark Error");
    output::error(ui.rule());

    output::error(style.paint_stderr(Color::Red, err.title()));
    output::error("");

    let sections = [
        ("Reason:", err.reason()),
        ("What this means:", err.meaning()),
        ("Suggested action:", err.action()),
    ];
    for (heading, body) in sections {
        if let Some(body) = body {
            output::error(heading);
            output::error(body);
            output::error("");
        }
    }

    output::error(ui.rule());
}
