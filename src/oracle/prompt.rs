use crate::expression::FUNCTIONS;
use crate::models::{DataModelVocabulary, LegacyLogicFile};

use super::types::ChatMessage;

/// System message, one message per legacy file, then the closing instruction.
pub fn build_messages(
    files: &[LegacyLogicFile],
    vocabulary: &DataModelVocabulary,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(files.len() + 2);
    messages.push(ChatMessage::system(system_message()));
    messages.extend(files.iter().map(|file| ChatMessage::user(source_message(file))));
    messages.push(ChatMessage::user(closing_message(vocabulary)));
    messages
}

fn system_message() -> String {
    format!(
        r#"You are a programming assistant whose answers are short and precise.
You know Altinn 3 dynamic expressions, a JSON DSL that app owners write in configuration files to get dynamic behaviour.
A function call is a JSON array: the first item is the function name, the following items are its arguments. Calls can be nested without limit.
Valid functions are: {functions}.

Notes on some functions:
- if: takes 2 or 4 arguments. With 2, it returns the second argument when the first is true, otherwise null. With 4, the third argument must be the string "else" and the fourth is returned when the first is false.
- not: returns the opposite boolean of its single argument.
- greaterThan, greaterThanEq, lessThan, lessThanEq: compare the first number to the second.
- and: are all arguments true? or: is at least one argument true?
- concat: joins zero or more strings.

Always use double quotes for strings inside expressions.

Example: "Page1": ["equals", ["dataModel", "funeral.isDead"], true]"#,
        functions = FUNCTIONS.join(", ")
    )
}

fn source_message(file: &LegacyLogicFile) -> String {
    format!(
        "I have the following C# code from {path}:\n```csharp\n{source}\n```\n\
         Can you extract the logic in the if expressions of the GetPageOrder method?",
        path = file.path.display(),
        source = file.source
    )
}

fn closing_message(vocabulary: &DataModelVocabulary) -> String {
    let paths = if vocabulary.is_empty() {
        "(no data model metadata was found)".to_string()
    } else {
        vocabulary.paths().join(", ")
    };

    format!(
        r#"Based on the previous logic, convert the expressions into Altinn 3 dynamic expressions for each page.
The expression is used as the "hidden" property of a page layout, so the page is hidden when the expression evaluates to true.

Previously GetPageOrder only ran when the user pressed the next page button. Hidden expressions are evaluated every time a page is loaded, so take care with nullable values: a condition that relied on a value being set must still behave correctly while the value is null.

Valid paths in the data model are {paths}.
Always use double quotes when writing strings inside the expressions.

Use the provided function updatePageHidden to update the hidden property on every affected page.
You don't need to provide an answer in addition to the function calls."#
    )
}
