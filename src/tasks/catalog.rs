//! Support task catalog: personas and the keys their envelopes carry.

use super::structured::{Persona, StructuredTask, TaskContext};

/// One entry of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskSpec {
    /// Task (pipeline node) name
    pub name: &'static str,
    /// Persona role
    pub role: &'static str,
    /// What the agent is told to do
    pub duty: &'static str,
    /// Envelope keys besides `concise_reason`, with their value hints
    pub fields: &'static [(&'static str, &'static str)],
    /// Key a caller extracts from `response`
    pub key: &'static str,
}

pub const TENANT_RESOLVER: TaskSpec = TaskSpec {
    name: "TenantIdentification",
    role: "TenantResolver",
    duty: "You are the Tenant Resolver. Your task is to classify the customer query into one of the two categories: ecom, fintech.",
    fields: &[("tenant_type", "<one of: ecom, fintech>")],
    key: "tenant_type",
};

pub const ROUTER: TaskSpec = TaskSpec {
    name: "RouteIssue",
    role: "Router",
    duty: "You are the Support Router. Your task is to classify the customer issue into one of the following categories: billing, technical, general.",
    fields: &[("issue_type", "<one of: billing, technical, general>")],
    key: "issue_type",
};

pub const SENTIMENT: TaskSpec = TaskSpec {
    name: "AnalyzeSentiment",
    role: "SentimentAnalyzer",
    duty: "You are a sentiment classifier. Your task is to analyze the sentiment of a given text and classify it as one of the following categories: Positive, Neutral, or Negative.",
    fields: &[("sentiment", "<one of: Positive, Neutral, Negative>")],
    key: "sentiment",
};

pub const ESCALATION: TaskSpec = TaskSpec {
    name: "CheckEscalation",
    role: "Escalation",
    duty: "You are a triage specialist. Your task is to determine if a customer issue needs escalation.\n\
           - If sentiment is Negative OR the issue type is Technical, classify as 'ESCALATE'.\n\
           - Otherwise, classify as 'NO_ESCALATION'.",
    fields: &[("escalation_decision", "<one of: ESCALATE, NO_ESCALATION>")],
    key: "escalation_decision",
};

pub const RESPONDER: TaskSpec = TaskSpec {
    name: "GenerateResponse",
    role: "Responder",
    duty: "You are a helpful customer support assistant. Your task is to craft an empathetic and helpful response to the user by considering the provided issue, sentiment, knowledge base context, and conversation history.",
    fields: &[("message", "<empathetic and helpful response crafted for the user>")],
    key: "message",
};

pub const ORDER_ID_EXTRACTOR: TaskSpec = TaskSpec {
    name: "OrderIDExtraction",
    role: "OrderIDExtractor",
    duty: "You are the Order ID Extractor. Your task is to extract the order id from the query. Order ids look like ORD-0017 or ORD-0149: ORD, a hyphen and a 4 digit number. If the query has no order id, use None.",
    fields: &[("order_id", "<extracted order id>")],
    key: "order_id",
};

pub const ORDER_INFO_EXTRACTOR: TaskSpec = TaskSpec {
    name: "OrderInfoExtraction",
    role: "OrderInfoExtractor",
    duty: "You are the Order Info Extractor. Your task is to extract the main info from the full order info that will help in better answering the user query.",
    fields: &[("order_info", "<extracted order info>")],
    key: "order_info",
};

pub const CUSTOMER_INFO_EXTRACTOR: TaskSpec = TaskSpec {
    name: "CustomerInfoExtraction",
    role: "CustomerInfoExtractor",
    duty: "You are the Customer Info Extractor. Your task is to extract the customer info related to the user query from the provided full information about the customer. Return only the entries that help in better answering the user query.",
    fields: &[("customer_info", "<customer info>")],
    key: "customer_info",
};

pub const TICKET_EXTRACTOR: TaskSpec = TaskSpec {
    name: "TicketExtraction",
    role: "TicketExtractor",
    duty: "You are the Ticket Extractor. Your task is to extract the existing tickets related to the user query from the provided list of relevant tickets. Return only the tickets that help in better answering the user query.",
    fields: &[("related_tickets", "<related filtered tickets>")],
    key: "related_tickets",
};

pub const FAQ_EXTRACTOR: TaskSpec = TaskSpec {
    name: "FAQExtraction",
    role: "FAQExtractor",
    duty: "You are the FAQ Extractor. Your task is to extract the FAQs related to the user query from the provided list of relevant FAQs. Return only the FAQs that help in better answering the user query.",
    fields: &[("related_faqs", "<related filtered faqs>")],
    key: "related_faqs",
};

pub const POLICY_EXTRACTOR: TaskSpec = TaskSpec {
    name: "PolicyExtraction",
    role: "PolicyExtractor",
    duty: "You are the Policy Extractor. Your task is to extract the policies related to the user query from the provided list of relevant policies. Return only the policies that help in better answering the user query.",
    fields: &[("related_policies", "<related filtered policy>")],
    key: "related_policies",
};

pub const HANDBOOK_EXTRACTOR: TaskSpec = TaskSpec {
    name: "HandbookExtraction",
    role: "HandbookExtractor",
    duty: "You are the Handbook Extractor. Your task is to extract the handbook entries related to the user query from the provided list of relevant handbook entries. Return only the entries that help in better answering the user query.",
    fields: &[("related_handbooks", "<related filtered handbook>")],
    key: "related_handbooks",
};

pub const IMAGE_PATH_EXTRACTOR: TaskSpec = TaskSpec {
    name: "ImagePathExtraction",
    role: "ImagePathExtractor",
    duty: "You are the Image Path Extractor. Your task is to extract the path of the product image the user uploaded from the query. If the query has no image path, use None.",
    fields: &[("image_path", "<extracted image path>")],
    key: "image_path",
};

pub const RETURN_VALIDATOR: TaskSpec = TaskSpec {
    name: "ReturnValidation",
    role: "ReturnValidator",
    duty: "You are the Return Item Validator. Your task is to check the information retrieved for a user-uploaded image of a product being returned and verify that it is the same product as in the original product information. \
           The return is acceptable if it is the same product, even when damaged or slightly different. A slight mismatch is fine, a large one is not.\n\
           The max score possible is 0.5. A score of 0.5 means a perfect match.",
    fields: &[
        ("is_same_product", "<one of: yes, no>"),
        ("is_returnable", "<one of: yes, no>"),
    ],
    key: "is_returnable",
};

pub const QUALITY_CHECKER: TaskSpec = TaskSpec {
    name: "ProductQualityChecker",
    role: "ProductQualityChecker",
    duty: "You are the Product Quality Checker. Your task is to compare the information retrieved for a user-uploaded product image against the original reference product information and determine whether the uploaded product is damaged or different. \
           A return is not acceptable if the product is damaged.\n\
           The max score possible is 0.5. A score of 0.5 means a perfect match.",
    fields: &[
        ("is_same_product", "<one of: yes, no>"),
        ("defect_detected", "<one of: yes, no>"),
        ("is_returnable", "<one of: yes, no>"),
    ],
    key: "is_returnable",
};

impl TaskSpec {
    /// Persona prompt with the JSON envelope schema spelled out
    pub fn persona(&self) -> Persona {
        let mut schema = format!(
            "{{\n  \"agent_name\": \"{}\",\n  \"response\": {{\n",
            self.role
        );
        for (key, hint) in self.fields {
            schema.push_str(&format!("    \"{}\": \"{}\",\n", key, hint));
        }
        schema.push_str("    \"concise_reason\": \"<brief reason>\"\n  }\n}");

        Persona::new(
            self.role,
            format!(
                "{}\n\nRespond strictly in JSON format with the following schema:\n\n{}\n\n\
                 Instructions:\n\
                 - Always use exactly the above structure.\n\
                 - Do not include any additional text or explanation outside the JSON.\n",
                self.duty, schema
            ),
        )
    }

    /// Task with this persona, given instructions and no context
    pub fn task(&self, instructions: impl Into<String>) -> StructuredTask {
        StructuredTask::new(self.name, instructions).with_persona(self.persona())
    }

    /// Task whose input is a context mapping rather than free instructions
    pub fn task_with_context(&self, context: TaskContext) -> StructuredTask {
        StructuredTask::new(self.name, "")
            .with_persona(self.persona())
            .with_context(context)
    }
}

/// Every catalog entry
pub const ALL: [TaskSpec; 15] = [
    TENANT_RESOLVER,
    ROUTER,
    SENTIMENT,
    ESCALATION,
    RESPONDER,
    ORDER_ID_EXTRACTOR,
    ORDER_INFO_EXTRACTOR,
    CUSTOMER_INFO_EXTRACTOR,
    TICKET_EXTRACTOR,
    FAQ_EXTRACTOR,
    POLICY_EXTRACTOR,
    HANDBOOK_EXTRACTOR,
    IMAGE_PATH_EXTRACTOR,
    RETURN_VALIDATOR,
    QUALITY_CHECKER,
];
