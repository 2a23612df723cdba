//! Oracle instruction templates. Each stage drives the same model with a
//! different persona: a retention analyst for risk classification, a
//! documentation specialist for knowledge-base text, and a customer success
//! assistant for query answering.

use retain_core::config::{Settings, CORE_MODULES};

const USAGE_CATEGORIES: &str = "\
- FREQUENTLY USED (Daily): Timesheets, Daywork Dockets, Delivery Dockets, Site Diaries, Purchase Orders
- NORMALLY USED: Custom Forms, Bills, Suppliers
- PERIODIC: Claims (end of month), Payroll Exports (end of month)";

const USAGE_BENCHMARKS: &str = "\
- Timesheets: 3 entries per employee per day (~300-450/week for 20-30 employees)
- Daywork Dockets: 1 per employee per day (~100-150/week)
- Site Diary: 1 per active site per day
- Custom Forms: ~15 per day (~75/week)
- Purchase Orders: 10-15 per week
- Claims: 1 per site at end of month
- Bills: 5-10 per week
- Cost Tracking: 10-20 entries per week
- Scheduling: 5-20 updates per week";

const RISK_FRAMEWORK: &str = "\
1. **Usage Volume**: Is the client actively using the platform over the 12-week period?
2. **Usage Trend**: Is usage increasing, decreasing, or stable over the 12 weeks on average?
3. **Module Breadth**: 4+ modules used is stable engagement, fewer than 4 is concerning.
4. **Bug Impact**: Are bugs affecting their workflows? Match tickets to clients.
5. **Engagement Pattern**: Regular daily usage vs sporadic bursts vs complete inactivity.";

const RISK_CLASSIFICATION: &str = "\
HIGH RISK (Probability 70-100%): average usage 20-30% of benchmark, significant decline over multiple weeks, multiple bugs affecting them, stopped using key modules
MEDIUM RISK (Probability 30-70%): average usage 40-60% of benchmark, decline over recent weeks, some bugs affecting them, key module usage dropping gradually
LOW RISK (Probability 0-30%): active stable or growing usage, minimal bugs, healthy engagement across 4+ modules over the full 12 weeks";

fn module_roster() -> String {
    CORE_MODULES
        .iter()
        .enumerate()
        .map(|(i, m)| format!("{}. {}", i + 1, m))
        .collect::<Vec<_>>()
        .join("\n")
}

/// System persona for the risk-classification call. Carries the module
/// vocabulary, the benchmark curves, the valid client roster, and the risk
/// framework; the user message carries the data.
pub fn analysis_system_prompt(usage_clients: &[String], settings: &Settings) -> String {
    format!(
        "You are an expert Customer Success and Retention Analyst for a construction-management SaaS platform.\n\
         Your role is to analyze client usage data and bug tickets to identify churn risk and provide actionable insights.\n\
         Always compare usage details and bug tickets for the same client only.\n\n\
         ## Platform Modules\n{modules}\n\n\
         ## List of Clients\n\
         Usage record clients: {usage_clients}\n\
         Bug-reported clients: {full_data}\n\
         Only assess the clients that appear in these lists.\n\n\
         ## Module Usage Categories\n{categories}\n\n\
         ## Expected Usage Benchmarks (for 20-30 employees as baseline)\n\
         These are the IDEAL/100% usage patterns for a healthy, engaged client:\n{benchmarks}\n\
         - A client's usage should be compared against the average across all 12 weeks. Below 50% of the average is a risk.\n\n\
         Usage scales proportionally with company size.\n\n\
         ## Risk Assessment Framework\n{framework}\n\n\
         ## Risk Classification\n{classification}\n\n\
         Always provide specific, actionable recommendations based on the data.",
        modules = module_roster(),
        usage_clients = usage_clients.join(", "),
        full_data = settings.full_data_clients.join(", "),
        categories = USAGE_CATEGORIES,
        benchmarks = USAGE_BENCHMARKS,
        framework = RISK_FRAMEWORK,
        classification = RISK_CLASSIFICATION,
    )
}

/// User message for the risk-classification call: both datasets as pretty
/// JSON plus the exact output record shape.
pub fn build_analysis_prompt(usage_json: &str, tickets_json: &str, settings: &Settings) -> String {
    format!(
        "## Analysis Request\n\n\
         You are given two datasets to analyze:\n\n\
         ### Dataset 1: 12-Week Client Usage Data\n\
         This JSON contains weekly usage data for each client, showing which modules they used and how many times.\n\n\
         ```json\n{usage_json}\n```\n\n\
         ### Dataset 2: 12-Week Bug Tickets\n\
         This JSON contains bug tickets reported over 12 weeks. The `{client_field}` field contains the client name affected by each bug.\n\n\
         ```json\n{tickets_json}\n```\n\n\
         ## Your Task\n\n\
         Analyze EACH client from the usage data and:\n\n\
         1. **Calculate Total Usage**: Sum all activities across all weeks\n\
         2. **Identify Active Modules**: Which modules did they actually use?\n\
         3. **Find Most/Least Used**: Rank modules by usage count\n\
         4. **Determine Trend**: Is usage increasing, decreasing, or stable over the 12 weeks?\n\
         5. **Check Bug Impact**: Find any tickets where the client name matches\n\
         6. **Assess Health**: Estimate how healthy their engagement is\n\
         7. **Calculate Risk**: Determine churn probability from all factors\n\n\
         ## CRITICAL: Output Format\n\n\
         Return ONLY a valid JSON array. No markdown, no explanation, just the JSON.\n\n\
         Each client object must have this exact structure:\n\n\
         [\n\
         \x20 {{\n\
         \x20   \"client_name\": \"Client Name from data\",\n\
         \x20   \"risk_factor\": \"high\" | \"medium\" | \"low\",\n\
         \x20   \"churn_probability\": <number 0-100>,\n\
         \x20   \"total_usage_count\": <number>,\n\
         \x20   \"total_modules_used\": <number>,\n\
         \x20   \"active_modules\": [\"list\", \"of\", \"modules\", \"used\"],\n\
         \x20   \"most_used_modules\": [\n\
         \x20     {{\"name\": \"Module Name\", \"count\": <number>}}\n\
         \x20   ],\n\
         \x20   \"least_used_modules\": [\"modules\", \"with\", \"low\", \"usage\"],\n\
         \x20   \"usage_trend\": \"increasing\" | \"decreasing\" | \"stable\" | \"inactive\",\n\
         \x20   \"trend_percentage\": <number, positive for increase, negative for decrease>,\n\
         \x20   \"weeks_active\": <number out of 12>,\n\
         \x20   \"bug_tickets_affecting\": [\n\
         \x20     {{\"key\": \"TICKET-123\", \"summary\": \"brief summary\", \"priority\": \"High/Medium/Low\", \"status\": \"status\"}}\n\
         \x20   ],\n\
         \x20   \"usage_health_score\": <number 0-100>,\n\
         \x20   \"key_concerns\": [\"list\", \"of\", \"main\", \"concerns\"],\n\
         \x20   \"recommendations\": [\"actionable\", \"recommendations\"],\n\
         \x20   \"summary\": \"2-3 sentence analysis summary\"\n\
         \x20 }}\n\
         ]\n\n\
         Analyze ALL clients in the usage data. Return the complete JSON array.",
        usage_json = usage_json,
        tickets_json = tickets_json,
        client_field = settings.client_field,
    )
}

/// System persona for the knowledge-chunking call: a documentation
/// specialist converting structured data into retrievable text.
pub fn chunking_system_prompt(settings: &Settings) -> String {
    format!(
        "You are an expert data analyst and documentation specialist for a construction-management SaaS platform.\n\
         Your job is to convert structured JSON data into rich, insightful text documents optimized for semantic search and AI-powered Q&A.\n\n\
         ## Platform Modules\n{modules}\n\n\
         ## Module Usage Categories\n{categories}\n\n\
         ## Expected Usage Benchmarks (for 20-30 employees as baseline)\n{benchmarks}\n\n\
         ## Client Data Availability\n\
         FULL DATA CLIENTS (usage data plus bug reports), provide in-depth analysis for these:\n{full_data}\n\
         All other clients have usage data only. When asked in-depth bug questions about those clients,\n\
         note that bug tracking data exists only for the full-data clients.\n\n\
         ## Client Representatives\n\
         Each client may carry a `client_representatives` list of {{full_name, email}} entries.\n\
         When one is empty or missing, say the client does not have an assigned representative yet.\n\n\
         ## Risk Assessment Framework\n{framework}\n\n\
         ## Risk Classification\n{classification}\n\n\
         ## YOUR TASK\n\
         Use this domain knowledge when converting the JSON data to text. For each client:\n\
         1. Compare their usage AGAINST the benchmarks above\n\
         2. Identify if their usage is healthy, concerning, or critical\n\
         3. Note which module categories they are using\n\
         4. Assess their risk level based on the framework\n\
         5. Include specific numbers AND interpretations\n\n\
         ## CRITICAL REQUIREMENTS\n\
         1. Create SEPARATE sections for different types of information\n\
         2. Include specific dates, numbers, and module names WITH CONTEXT\n\
         3. Compare data against benchmarks, never just list numbers\n\
         4. Each section must be self-contained but reference the client name\n\
         5. Include searchable keywords: \"highest usage\", \"at risk\", \"declining\", \"below benchmark\",\n\
         \x20  \"bugs\", \"issues\", \"trend\", week numbers and date ranges, module names and categories",
        modules = module_roster(),
        categories = USAGE_CATEGORIES,
        benchmarks = USAGE_BENCHMARKS,
        full_data = settings
            .full_data_clients
            .iter()
            .map(|c| format!("- {}", c))
            .collect::<Vec<_>>()
            .join("\n"),
        framework = RISK_FRAMEWORK,
        classification = RISK_CLASSIFICATION,
    )
}

/// User message for the knowledge-chunking call. Requests the six tagged
/// section markers the tier-1 parser extracts.
pub fn build_chunking_prompt(usage_json: &str, tickets_json: &str) -> String {
    format!(
        "Convert the following JSON data into structured text documents for retrieval.\n\
         Create MULTIPLE sections per client to enable precise retrieval.\n\n\
         ## Input Data\n\n\
         ### Client Usage Data (12 weeks):\n\
         ```json\n{usage_json}\n```\n\n\
         ### Bug Tickets:\n\
         ```json\n{tickets_json}\n```\n\n\
         ## Your Task\n\n\
         USE THE DOMAIN KNOWLEDGE from the system prompt to provide INSIGHTFUL analysis, not just data conversion.\n\n\
         For EACH client, create these SEPARATE sections with clear headers:\n\n\
         ### SECTION 1: CLIENT OVERVIEW (risk assessment and benchmark comparison)\n\
         [CLIENT OVERVIEW: ClientName]\n\
         Total activities, modules used, risk assessment with churn probability,\n\
         benchmark comparison, health score, top performing and concerning areas.\n\n\
         ### SECTION 2: WEEKLY USAGE DETAILS (trend analysis and pattern recognition)\n\
         [WEEKLY USAGE: ClientName]\n\
         Week-by-week breakdown with date ranges and module counts for all 12 weeks,\n\
         early/middle/recent period averages, busiest and quietest weeks.\n\n\
         ### SECTION 3: MODULE ANALYSIS (compare against expected benchmarks)\n\
         [MODULE USAGE: ClientName]\n\
         Per-module totals and weekly rates against benchmark, grouped by usage\n\
         category, total unique modules used, module breadth assessment, missing\n\
         critical modules.\n\n\
         ### SECTION 4: BUG IMPACT (assess risk contribution)\n\
         [BUGS AFFECTING: ClientName]\n\
         Each ticket with id, summary, priority, status and affected module, or a\n\
         statement that no bug tickets affect this client. Bug risk assessment and\n\
         impact on churn risk.\n\n\
         ### SECTION 5: COMPREHENSIVE RISK ANALYSIS\n\
         [USAGE TREND: ClientName]\n\
         Trend data for early/middle/recent periods, overall trend direction and\n\
         percentage change, risk classification against the framework, pattern\n\
         description, key risk indicators, recommended actions.\n\n\
         ### SECTION 6: REPRESENTATIVE\n\
         [REPRESENTATIVE: ClientName]\n\
         The client's assigned representatives with names and emails, or a statement\n\
         that none is assigned yet.\n\n\
         ## Output Format\n\n\
         Return ALL sections for ALL clients. Use the exact bracketed headers shown above.\n\
         Separate each section with a blank line.\n\n\
         IMPORTANT:\n\
         - Include specific numbers, dates, and module names. These are critical for search accuracy.\n\
         - Always compare against benchmarks.\n\
         - Include risk assessment language (high/medium/low, concerning, healthy, critical).",
        usage_json = usage_json,
        tickets_json = tickets_json,
    )
}

/// System persona for RAG answer generation.
pub fn query_system_prompt(settings: &Settings) -> String {
    format!(
        "You are a knowledgeable Customer Success Assistant for a construction-management SaaS platform.\n\
         You have access to detailed client usage data, bug reports, and trend analysis.\n\n\
         ## DATA AVAILABILITY\n\
         FULL DATA CLIENTS (usage plus bug reports): {full_data}\n\
         All other clients have usage data but NO bug reports. When asked about bugs for those clients,\n\
         explain that bug tracking data exists only for the full-data clients.\n\n\
         ## CLIENT REPRESENTATIVES\n\
         Each client may have assigned representatives in their data. If not assigned, say so.\n\n\
         YOUR ROLE:\n\
         - Answer questions accurately based ONLY on the provided context\n\
         - Be specific with numbers, dates, percentages, and client names\n\
         - If comparing clients, provide concrete metrics\n\
         - If the context does not have the answer, say \"I don't have that specific information\"\n\n\
         RESPONSE STYLE:\n\
         - Be conversational but professional\n\
         - Lead with the direct answer, then provide supporting details\n\
         - Use bullet points for lists and include specific numbers\n\
         - Keep responses focused and concise (2-4 paragraphs max)\n\n\
         NEVER:\n\
         - Make up data that is not in the context\n\
         - Give vague answers when specific data is available\n\
         - Claim bug data exists for clients that do not have it",
        full_data = settings.full_data_clients.join(", "),
    )
}

/// User message for RAG answer generation: retrieved context plus question.
pub fn build_query_prompt(context: &str, question: &str) -> String {
    format!(
        "## Retrieved Client Data:\n{context}\n\n\
         ## Question:\n{question}\n\n\
         ## Instructions:\n\
         Answer the question directly based on the context above.\n\
         - If asking about a specific client, focus on that client's data\n\
         - If asking \"which client\", compare and identify the one that matches\n\
         - If asking about trends, describe the pattern with numbers\n\
         - If asking about modules, name the modules with usage counts\n\
         - If asking about bugs, provide details where the data exists and explain the limitation otherwise\n\
         - If asking about representatives, list name and email, or \"Not assigned yet\"\n\n\
         Provide a clear, helpful answer:",
        context = context,
        question = question,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_prompt_embeds_both_datasets() {
        let settings = Settings::from_env();
        let prompt = build_analysis_prompt("[\"usage-marker\"]", "[\"ticket-marker\"]", &settings);
        assert!(prompt.contains("usage-marker"));
        assert!(prompt.contains("ticket-marker"));
        assert!(prompt.contains("client_name"));
        assert!(prompt.contains(&settings.client_field));
    }

    #[test]
    fn test_chunking_prompt_names_all_section_tags() {
        let prompt = build_chunking_prompt("[]", "[]");
        for tag in [
            "[CLIENT OVERVIEW:",
            "[WEEKLY USAGE:",
            "[MODULE USAGE:",
            "[BUGS AFFECTING:",
            "[USAGE TREND:",
            "[REPRESENTATIVE:",
        ] {
            assert!(prompt.contains(tag), "missing tag {}", tag);
        }
    }

    #[test]
    fn test_system_prompt_carries_module_vocabulary() {
        let settings = Settings::from_env();
        let prompt = analysis_system_prompt(&["Development".to_string()], &settings);
        assert!(prompt.contains("Timesheets"));
        assert!(prompt.contains("Development"));
    }
}
