use minesweeper_agent::{Agent, Board, Point};
use std::collections::HashMap;
use std::thread;
use std::time::Duration;

fn main() {
    // --- 1. Initialization ---
    let mut rng = rand::rng();
    let board = Board::new(8, 8, 8, &mut rng);
    let mut agent = Agent::new(board.height, board.width);
    let mut revealed: HashMap<Point, u8> = HashMap::new();

    println!("--- Knowledge-Based Minesweeper Agent ---");
    println!("Strategy: play deduced safe cells, guess only when logic runs dry.");

    let safe_cells = board.height * board.width - board.total_mines();
    let mut move_count = 0;

    // --- 2. Game Loop ---
    let outcome = loop {
        if agent.moves_made().len() == safe_cells {
            break "The agent cleared the board!";
        }
        move_count += 1;
        println!("\n--- Move #{} ---", move_count);

        // --- 3. Agent's Decision Logic ---

        // First, ask for a cell the knowledge base has proven safe.
        let (cell, guessed) = match agent.choose_safe_move() {
            Some(cell) => {
                println!("Logic found a guaranteed safe cell.");
                (cell, false)
            }
            None => match agent.choose_guess_move(&mut rng) {
                Some(cell) => {
                    println!("No safe cell is forced. Guessing at random...");
                    (cell, true)
                }
                None => break "No cells left to play.",
            },
        };

        // --- 4. Execute the Chosen Move ---
        println!("Agent reveals ({}, {})...", cell.row, cell.col);

        // Only a guess can hit a mine; deduced moves are proven safe.
        if guessed && board.is_mine(cell) {
            agent.record_move(cell);
            break "The guess hit a mine.";
        }

        let count = board.reveal(cell).unwrap();
        agent.add_knowledge(cell, count as usize).unwrap();
        revealed.insert(cell, count);

        print_board(&board, &agent, &revealed);

        // Add a delay to make the game watchable
        thread::sleep(Duration::from_millis(200));
    };

    // --- 5. Final Result ---
    println!("\n--- Game Over ---");
    println!("Result: {}", outcome);
    println!(
        "Revealed {} of {} safe cells, flagged {} mines.",
        revealed.len(),
        safe_cells,
        agent.mines().len()
    );
}

fn print_board(board: &Board, agent: &Agent, revealed: &HashMap<Point, u8>) {
    // Print header
    print!("   ");
    for col in 0..board.width {
        print!("{:^3}", col);
    }
    println!("\n  +{}", "---".repeat(board.width));

    // Print rows
    for row in 0..board.height {
        print!("{:^2}|", row);
        for col in 0..board.width {
            let cell = Point { row, col };
            let display = match revealed.get(&cell) {
                Some(n) => format!(" {} ", n),
                None if agent.mines().contains(&cell) => " * ".to_string(),
                None => " ■ ".to_string(),
            };
            print!("{}", display);
        }
        println!();
    }
    println!();
}
