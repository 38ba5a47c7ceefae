//! TMDL (Tabular Model Definition Language) documents: a span-preserving
//! parser and an edit-based serializer.

mod document;
pub mod names;
mod parser;

pub use document::{Expression, ModelDocument, ModelObject, Name, Property, PropertyValue};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{TextEdit, TextSpan};

    const SALES: &str = "table 'tbl_Sales'\n\tlineageTag: 1f2e\n\n\tmeasure 'Total Sales' =\n\t\t\tSUMX(\n\t\t\t    'tbl_Sales',\n\t\t\t    'tbl_Sales'[Amount]   // gross\n\t\t\t)\n\t\tformatString: \"#,0\"\n\n\tcolumn Amount\n\t\tdataType: decimal\n\t\tsummarizeBy: sum\n\t\tsourceColumn: Amount\n\n\t\tannotation SummarizationSetBy = Automatic\n\n";

    #[test]
    fn test_round_trip_without_edits_is_byte_identical() {
        for text in [
            SALES,
            "relationship abc\r\n\tfromColumn: A.B\r\n\ttoColumn: C.D\r\n",
            "model Model\n\tculture: en-US\n\nref table 'tbl_Sales'\nref table Date",
        ] {
            let document = ModelDocument::parse(text).unwrap();
            assert_eq!(document.serialize(&[]).unwrap(), text);
        }
    }

    #[test]
    fn test_serialize_touches_only_edited_ranges() {
        let document = ModelDocument::parse(SALES).unwrap();
        let table = document.tables().next().unwrap();
        let name_span = table.name.as_ref().unwrap().span;
        let edited = document
            .serialize(&[TextEdit::new(name_span, "'Fact Sales'")])
            .unwrap();
        assert_eq!(edited, SALES.replacen("table 'tbl_Sales'", "table 'Fact Sales'", 1));
        assert!(ModelDocument::parse(&edited).is_ok());
    }

    #[test]
    fn test_position_of_name() {
        let document = ModelDocument::parse(SALES).unwrap();
        let column = &document.tables().next().unwrap().children[1];
        let span: TextSpan = column.name.as_ref().unwrap().span;
        assert_eq!(document.position(span.start), (11, 9));
    }
}
